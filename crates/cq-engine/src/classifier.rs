//! Intent classifier: scores normalized unigram/bigram features against a
//! fixed weight vector per intent.
//!
//! Pure and infallible. Empty or unmatched text yields `(Unknown, 0.0)`.
//! Equal scores resolve by `Intent::priority`, which ranks destructive
//! intents last.

use std::collections::{BTreeSet, HashMap};

use cq_protocol::Intent;
use serde::{Deserialize, Serialize};

use crate::normalize::{self, phrase_feature};

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
        }
    }
}

// ── Weight vectors ──────────────────────────────────────────────
//
// Keys are surface phrases; they pass through the same normalizer as the
// instruction text. Negative weights steer read-style phrasing away from
// destructive intents.

const DROP_MISSING: &[(&str, f64)] = &[
    ("missing", 0.8),
    ("null", 0.8),
    ("nan", 0.8),
    ("blank", 0.6),
    ("empty", 0.6),
    ("be missing", 0.6),
    ("missing value", 0.4),
    ("remove", 0.3),
    ("drop", 0.4),
    ("delete", 0.3),
    ("exclude", 0.3),
    ("discard", 0.3),
    ("show", -0.8),
    ("list", -0.6),
    ("count", -0.9),
    ("how many", -0.9),
    ("fill", -0.9),
    ("replace", -0.9),
    // A relative clause reads as a condition unless a deletion verb
    // outweighs it.
    ("where", -0.6),
    ("whose", -0.6),
    ("which", -0.6),
];

const REPLACE_VALUE: &[(&str, f64)] = &[
    ("replace", 1.2),
    ("recode", 1.0),
    ("substitute", 1.0),
    ("fill", 1.0),
    ("impute", 1.0),
    ("change", 0.6),
    ("set", 0.4),
    ("map", 0.4),
    ("with", 0.2),
    ("fill missing", 0.4),
    ("show", -0.5),
];

const FILTER_ROWS: &[(&str, f64)] = &[
    ("filter", 1.0),
    ("where", 0.4),
    ("only", 0.4),
    ("find", 0.4),
    ("which", 0.2),
    ("whose", 0.4),
    ("show", 0.3),
    ("list", 0.3),
    ("older than", 1.0),
    ("younger than", 1.0),
    ("greater than", 0.7),
    ("less than", 0.7),
    ("more than", 0.6),
    ("fewer than", 0.6),
    ("at least", 0.6),
    ("at most", 0.6),
    ("above", 0.5),
    ("below", 0.5),
    ("over", 0.4),
    ("under", 0.4),
    ("after", 0.4),
    ("before", 0.4),
    ("between", 0.6),
    ("exceed", 0.5),
    ("equal", 0.4),
    ("be missing", 0.5),
    (">", 0.6),
    ("<", 0.6),
    (">=", 0.6),
    ("<=", 0.6),
    ("!=", 0.5),
    ("=", 0.3),
    ("count", -0.6),
    ("how many", -0.8),
    ("delete", -0.5),
    ("remove", -0.5),
];

const STANDARDIZE: &[(&str, f64)] = &[
    ("standardize", 1.2),
    ("reformat", 1.0),
    ("format", 0.7),
    ("convert", 0.5),
    ("consistent", 0.4),
    ("date", 0.4),
    ("iso", 0.6),
    ("<format>", 0.8),
];

const RENAME_COLUMN: &[(&str, f64)] = &[
    ("rename", 1.3),
    ("column name", 0.4),
    ("call", 0.3),
    ("relabel", 1.0),
];

const DROP_DUPLICATES: &[(&str, f64)] = &[
    ("duplicate", 1.2),
    ("dedupe", 1.2),
    ("deduplicate", 1.2),
    ("repeat", 0.5),
    ("unique", 0.4),
    ("remove", 0.2),
    ("drop", 0.2),
    ("delete", 0.2),
    ("show", -0.6),
    ("count", -0.9),
    ("how many", -0.9),
];

const AGGREGATE: &[(&str, f64)] = &[
    ("average", 1.0),
    ("mean", 1.0),
    ("median", 1.0),
    ("sum", 1.0),
    ("total", 0.6),
    ("minimum", 0.9),
    ("maximum", 0.9),
    ("min", 0.9),
    ("max", 0.9),
    ("lowest", 0.7),
    ("highest", 0.7),
    ("smallest", 0.6),
    ("largest", 0.6),
    ("aggregate", 0.8),
    ("total number", -0.6),
];

const NORMALIZE: &[(&str, f64)] = &[
    ("normalize", 1.3),
    ("rescale", 1.1),
    ("scale", 1.0),
    ("min max", 0.6),
];

const SELECT: &[(&str, f64)] = &[
    ("select", 1.0),
    ("show", 0.7),
    ("display", 0.7),
    ("list", 0.6),
    ("view", 0.6),
    ("get", 0.4),
    ("give me", 0.4),
    ("column", 0.2),
];

const COUNT: &[(&str, f64)] = &[
    ("count", 1.0),
    ("how many", 1.3),
    ("number of", 1.0),
    ("total number", 0.6),
    ("tally", 0.8),
    ("per", 0.3),
];

/// Placeholders such as `<format>` name a token class and are used as-is.
fn weight_key(phrase: &str) -> String {
    if phrase.len() > 2 && phrase.starts_with('<') && phrase.ends_with('>') {
        phrase.to_string()
    } else {
        phrase_feature(phrase)
    }
}

/// Rule-weighted intent classifier.
pub struct IntentClassifier {
    weights: Vec<(Intent, HashMap<String, f64>)>,
    threshold: f64,
}

impl IntentClassifier {
    pub fn new(threshold: f64) -> Self {
        let table: [(Intent, &[(&str, f64)]); 10] = [
            (Intent::DropMissing, DROP_MISSING),
            (Intent::ReplaceValue, REPLACE_VALUE),
            (Intent::FilterRows, FILTER_ROWS),
            (Intent::Standardize, STANDARDIZE),
            (Intent::RenameColumn, RENAME_COLUMN),
            (Intent::DropDuplicates, DROP_DUPLICATES),
            (Intent::Aggregate, AGGREGATE),
            (Intent::Normalize, NORMALIZE),
            (Intent::Select, SELECT),
            (Intent::Count, COUNT),
        ];
        let weights = table
            .into_iter()
            .map(|(intent, entries)| {
                let map = entries
                    .iter()
                    .map(|(phrase, w)| (weight_key(phrase), *w))
                    .collect();
                (intent, map)
            })
            .collect();
        Self { weights, threshold }
    }

    /// Every lemma that carries weight for some intent. The extractor uses
    /// this to keep command words out of fuzzy column matching.
    pub fn vocabulary(&self) -> BTreeSet<String> {
        self.weights
            .iter()
            .flat_map(|(_, m)| m.keys())
            .flat_map(|k| k.split(' '))
            .filter(|w| !w.starts_with('<'))
            .map(String::from)
            .collect()
    }

    /// Raw score per intent, in declaration order.
    pub fn scores(&self, text: &str) -> Vec<(Intent, f64)> {
        let feats = normalize::features(&normalize::lex(text));
        self.weights
            .iter()
            .map(|(intent, map)| {
                let score: f64 = feats.iter().filter_map(|f| map.get(f)).sum();
                (*intent, score)
            })
            .collect()
    }

    /// Classify `text`. Scores are squashed into [0, 1) with
    /// `1 - e^(-score)`; the winner must exceed the threshold.
    pub fn classify(&self, text: &str) -> Classification {
        let mut best: Option<(Intent, f64)> = None;
        for (intent, score) in self.scores(text) {
            best = match best {
                None => Some((intent, score)),
                Some((b, bs)) => {
                    let tie = (score - bs).abs() < 1e-9;
                    if score > bs + 1e-9 || (tie && intent.priority() < b.priority()) {
                        Some((intent, score))
                    } else {
                        Some((b, bs))
                    }
                }
            };
        }
        let Some((intent, score)) = best else {
            return Classification::unknown();
        };
        if score <= 0.0 {
            return Classification::unknown();
        }
        let confidence = 1.0 - (-score).exp();
        if confidence <= self.threshold {
            return Classification {
                intent: Intent::Unknown,
                confidence,
            };
        }
        Classification { intent, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Intent {
        IntentClassifier::new(0.35).classify(text).intent
    }

    // ── Supported phrasings ─────────────────────────────────────

    #[test]
    fn drop_missing() {
        assert_eq!(classify("Remove rows where age is missing"), Intent::DropMissing);
        assert_eq!(classify("drop rows with null values"), Intent::DropMissing);
    }

    #[test]
    fn condition_without_deletion_verb_is_a_filter() {
        assert_eq!(classify("patients where age is missing"), Intent::FilterRows);
        assert_eq!(classify("adverse events whose severity is missing"), Intent::FilterRows);
        assert_eq!(classify("Show patients where age is missing"), Intent::FilterRows);
        assert_eq!(classify("Delete patients whose age is missing"), Intent::DropMissing);
        assert_eq!(classify("Drop rows where severity is null"), Intent::DropMissing);
    }

    #[test]
    fn filter_rows() {
        assert_eq!(classify("Show patients older than 60"), Intent::FilterRows);
        assert_eq!(classify("Filter by blood_typ"), Intent::FilterRows);
        assert_eq!(classify("patients where age > 50"), Intent::FilterRows);
        assert_eq!(classify("labs with test_value between 10 and 20"), Intent::FilterRows);
    }

    #[test]
    fn replace_value() {
        assert_eq!(classify("Replace 'M' with 'Male' in gender"), Intent::ReplaceValue);
        assert_eq!(classify("fill missing age with 50"), Intent::ReplaceValue);
    }

    #[test]
    fn standardize() {
        assert_eq!(
            classify("Standardize enrollment_date to YYYY-MM-DD"),
            Intent::Standardize
        );
        assert_eq!(classify("reformat visit dates as DD/MM/YYYY"), Intent::Standardize);
    }

    #[test]
    fn rename_column() {
        assert_eq!(classify("Rename age to age_years"), Intent::RenameColumn);
    }

    #[test]
    fn drop_duplicates() {
        assert_eq!(classify("Remove duplicate patients"), Intent::DropDuplicates);
        assert_eq!(classify("dedupe visits"), Intent::DropDuplicates);
    }

    #[test]
    fn aggregate() {
        assert_eq!(classify("What is the average age by treatment arm"), Intent::Aggregate);
        assert_eq!(classify("max test_value in lab results"), Intent::Aggregate);
    }

    #[test]
    fn normalize() {
        assert_eq!(classify("Normalize test_value"), Intent::Normalize);
        assert_eq!(classify("scale age to 0-1"), Intent::Normalize);
    }

    #[test]
    fn select() {
        assert_eq!(classify("Show patient_id and age"), Intent::Select);
        assert_eq!(classify("select gender, status from patients"), Intent::Select);
    }

    #[test]
    fn count() {
        assert_eq!(classify("How many patients per site?"), Intent::Count);
        assert_eq!(classify("Count adverse events by severity"), Intent::Count);
        assert_eq!(classify("how many patients have missing age"), Intent::Count);
    }

    // ── Failure modes ───────────────────────────────────────────

    #[test]
    fn empty_and_gibberish_are_unknown() {
        let c = IntentClassifier::new(0.35);
        assert_eq!(c.classify(""), Classification::unknown());
        assert_eq!(c.classify("   "), Classification::unknown());
        assert_eq!(c.classify("the quick brown fox").intent, Intent::Unknown);
    }

    #[test]
    fn weak_signal_below_threshold() {
        let c = IntentClassifier::new(0.35);
        let out = c.classify("column");
        assert_eq!(out.intent, Intent::Unknown);
        assert!(out.confidence > 0.0 && out.confidence <= 0.35);
    }

    #[test]
    fn unmatched_word_scores_zero() {
        let c = IntentClassifier::new(0.0);
        let scores = c.scores("purge");
        assert!(scores.iter().all(|(_, s)| *s == 0.0));
        assert_eq!(c.classify("purge"), Classification::unknown());
    }

    #[test]
    fn tie_break_uses_priority() {
        let c = IntentClassifier {
            weights: vec![
                (Intent::DropDuplicates, HashMap::from([("x".to_string(), 1.0)])),
                (Intent::Select, HashMap::from([("x".to_string(), 1.0)])),
            ],
            threshold: 0.1,
        };
        assert_eq!(c.classify("x").intent, Intent::Select);
    }

    #[test]
    fn confidence_in_unit_interval() {
        let c = IntentClassifier::new(0.35);
        for text in ["How many patients per site?", "rename rename rename age to x"] {
            let conf = c.classify(text).confidence;
            assert!((0.0..=1.0).contains(&conf));
        }
    }

    #[test]
    fn vocabulary_contains_command_words() {
        let vocab = IntentClassifier::new(0.35).vocabulary();
        assert!(vocab.contains("filter"));
        assert!(vocab.contains(&normalize::lemma("duplicates")));
        assert!(!vocab.contains("<format>"));
    }
}
