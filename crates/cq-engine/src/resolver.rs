//! Name resolution for tables and columns: exact alias lookup first, then a
//! bounded edit-distance fallback. Several candidates within the bound is
//! an ambiguity, never a guess.

use std::collections::{BTreeSet, HashMap};

/// Outcome of resolving one word (or phrase) against a set of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Exact(String),
    Fuzzy { name: String, distance: usize },
    Ambiguous(Vec<String>),
    NoMatch,
}

/// Alias index over canonical names.
///
/// Each name is reachable as itself, with `_` read as a space, in singular
/// form, and for `*_id` names by the stem alone ("site" for `site_id`).
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    aliases: HashMap<String, String>,
    names: Vec<String>,
}

impl NameIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for name in names {
            index.add(name.as_ref());
        }
        index
    }

    fn add(&mut self, name: &str) {
        let lower = name.to_lowercase();
        let spaced = lower.replace('_', " ");
        let mut forms = vec![lower.clone(), spaced.clone(), singular(&spaced)];
        if let Some(stem) = lower.strip_suffix("_id") {
            forms.push(stem.replace('_', " "));
        }
        for form in forms {
            self.aliases.entry(form).or_insert_with(|| name.to_string());
        }
        self.names.push(name.to_string());
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Exact, case-insensitive alias lookup. Underscores and spaces are
    /// interchangeable and a trailing plural `s` is ignored.
    pub fn exact(&self, phrase: &str) -> Option<&str> {
        let key = phrase.to_lowercase().replace('_', " ");
        self.aliases
            .get(&key)
            .or_else(|| self.aliases.get(&singular(&key)))
            .map(String::as_str)
    }

    /// Resolve with fuzzy fallback. `max_distance` is further capped at a
    /// quarter of the word length so short words only match exactly.
    pub fn resolve(&self, word: &str, max_distance: usize) -> Resolution {
        if let Some(name) = self.exact(word) {
            return Resolution::Exact(name.to_string());
        }
        let bound = fuzzy_bound(word, max_distance);
        if bound == 0 {
            return Resolution::NoMatch;
        }
        let needle: Vec<char> = word.to_lowercase().replace(' ', "_").chars().collect();
        let mut best: HashMap<&str, usize> = HashMap::new();
        for (alias, name) in &self.aliases {
            let alias = alias.replace(' ', "_");
            let d = levenshtein_with_max(&alias, &needle, bound);
            if d <= bound {
                let slot = best.entry(name.as_str()).or_insert(d);
                *slot = (*slot).min(d);
            }
        }
        let mut found: Vec<(&str, usize)> = best.into_iter().collect();
        match found.len() {
            0 => Resolution::NoMatch,
            1 => {
                let (name, distance) = found.remove(0);
                Resolution::Fuzzy {
                    name: name.to_string(),
                    distance,
                }
            }
            _ => {
                let names: BTreeSet<String> = found.iter().map(|(n, _)| n.to_string()).collect();
                Resolution::Ambiguous(names.into_iter().collect())
            }
        }
    }
}

/// Effective edit-distance bound for a word.
pub fn fuzzy_bound(word: &str, max_distance: usize) -> usize {
    let len = word.chars().count();
    if len < 4 {
        0
    } else {
        max_distance.min(len / 4)
    }
}

fn singular(s: &str) -> String {
    if s.len() > 3 && s.ends_with('s') && !s.ends_with("ss") && !s.ends_with("us") {
        s[..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Levenshtein distance with early exit: returns `max_dist + 1` as soon as
/// every cell of a row exceeds the bound.
pub fn levenshtein_with_max(value: &str, needle_chars: &[char], max_dist: usize) -> usize {
    if max_dist == 0 {
        return if value.chars().eq(needle_chars.iter().copied()) {
            0
        } else {
            1
        };
    }

    let n = needle_chars.len();
    if n == 0 {
        return value.chars().count();
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for (i, c) in value.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];

        for j in 1..=n {
            let cost = usize::from(c != needle_chars[j - 1]);
            let d = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            curr[j] = d;
            row_min = row_min.min(d);
        }

        if row_min > max_dist {
            return max_dist + 1;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
