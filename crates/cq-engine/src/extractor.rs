//! Entity/parameter extractor.
//!
//! Runs after classification so the grammar can be intent-specific. Value
//! slots (operands, replacements, new names, formats) are claimed first;
//! only the words left over are matched against column names, exact
//! aliases before bounded fuzzy matches. Missing roles are recorded on the
//! `ParameterSet`; ambiguous names are an error.

use std::collections::{BTreeSet, HashSet};

use cq_protocol::{
    parse_any_date, AggregateFn, Extracted, Intent, Literal, Operator, ParamRole, ParameterSet,
    Schema, Span, TableSchema,
};

use crate::error::{EngineError, EngineResult};
use crate::normalize::{self, lemma, Token, TokenKind};
use crate::resolver::{NameIndex, Resolution};

// ── Lexical grammar ─────────────────────────────────────────────

/// Filler never matched as a column on its own.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "on", "for", "to", "from", "by", "with", "where", "and", "or",
    "all", "any", "each", "every", "row", "record", "entry", "value", "column", "field", "table",
    "dataset", "data", "that", "which", "whose", "have", "be", "please", "me", "what", "how",
    "many", "it", "its", "their", "as", "into", "than", "only", "just", "there", "this", "those",
    "per", "across", "based", "using", "group", "not", "no", "show", "list", "give", "get",
    "excluding", "except",
];

const NULL_WORDS: &[&str] = &["missing", "null", "empty", "blank", "nan", "na", "none", "absent"];

/// Negate whatever predicate follows. A bare "not" counts only right
/// before an operator phrase or a null word.
const NEGATORS: &[&str] = &["excluding", "except"];

/// Words that end an unquoted multi-word value.
const VALUE_STOPS: &[&str] = &[
    "and", "or", "in", "for", "from", "where", "with", "to", "by", "on", "per", "than", "of", "as",
];

const GROUP_KEYWORDS: &[&[&str]] = &[
    &["broken", "down", "by"],
    &["grouped", "by"],
    &["group", "by"],
    &["for", "each"],
    &["per"],
    &["by"],
    &["across"],
];

const SUBSET_KEYWORDS: &[&[&str]] = &[
    &["based", "on"],
    &["by"],
    &["on"],
    &["using"],
    &["considering"],
];

const REPLACE_VERBS: &[&str] = &[
    "replace", "change", "recode", "substitute", "map", "set", "fill", "impute", "convert",
];
const REPLACE_SEPARATORS: &[&str] = &["with", "to", "into", "by"];

const RENAME_VERBS: &[&str] = &["rename", "relabel", "call"];
const RENAME_SEPARATORS: &[&str] = &["to", "as", "into"];

const FORMAT_INTRODUCERS: &[&str] = &["to", "as", "into", "in", "format", "using"];
const FORMAT_WORDS: &[&str] = &["iso", "iso8601"];

const ALL_WORDS: &[&str] = &["all", "everything", "every"];

const AGGREGATES: &[(&str, AggregateFn)] = &[
    ("average", AggregateFn::Mean),
    ("avg", AggregateFn::Mean),
    ("mean", AggregateFn::Mean),
    ("median", AggregateFn::Median),
    ("sum", AggregateFn::Sum),
    ("total", AggregateFn::Sum),
    ("count", AggregateFn::Count),
    ("min", AggregateFn::Min),
    ("minimum", AggregateFn::Min),
    ("lowest", AggregateFn::Min),
    ("smallest", AggregateFn::Min),
    ("max", AggregateFn::Max),
    ("maximum", AggregateFn::Max),
    ("highest", AggregateFn::Max),
    ("largest", AggregateFn::Max),
];

struct OpPhrase {
    words: &'static [&'static str],
    op: Operator,
    /// Column the phrase implies when none is named ("older than" → age).
    implies: Option<&'static str>,
}

const fn op(words: &'static [&'static str], op: Operator) -> OpPhrase {
    OpPhrase {
        words,
        op,
        implies: None,
    }
}

const OPERATORS: &[OpPhrase] = &[
    op(&["greater", "than", "or", "equal", "to"], Operator::Ge),
    op(&["less", "than", "or", "equal", "to"], Operator::Le),
    op(&["not", "equal", "to"], Operator::Ne),
    op(&["no", "less", "than"], Operator::Ge),
    op(&["no", "more", "than"], Operator::Le),
    op(&["at", "least"], Operator::Ge),
    op(&["at", "most"], Operator::Le),
    op(&["greater", "than"], Operator::Gt),
    op(&["more", "than"], Operator::Gt),
    op(&["higher", "than"], Operator::Gt),
    op(&["later", "than"], Operator::Gt),
    OpPhrase {
        words: &["older", "than"],
        op: Operator::Gt,
        implies: Some("age"),
    },
    op(&["less", "than"], Operator::Lt),
    op(&["fewer", "than"], Operator::Lt),
    op(&["lower", "than"], Operator::Lt),
    op(&["earlier", "than"], Operator::Lt),
    OpPhrase {
        words: &["younger", "than"],
        op: Operator::Lt,
        implies: Some("age"),
    },
    op(&["equal", "to"], Operator::Eq),
    op(&["other", "than"], Operator::Ne),
    op(&["is", "not"], Operator::Ne),
    op(&["between"], Operator::Between),
    op(&["above"], Operator::Gt),
    op(&["over"], Operator::Gt),
    op(&["after"], Operator::Gt),
    op(&["exceeds"], Operator::Gt),
    op(&["exceeding"], Operator::Gt),
    op(&["below"], Operator::Lt),
    op(&["under"], Operator::Lt),
    op(&["before"], Operator::Lt),
    op(&["equals"], Operator::Eq),
    op(&[">="], Operator::Ge),
    op(&["<="], Operator::Le),
    op(&["!="], Operator::Ne),
    op(&["<>"], Operator::Ne),
    op(&["=="], Operator::Eq),
    op(&[">"], Operator::Gt),
    op(&["<"], Operator::Lt),
    op(&["="], Operator::Eq),
    // Weakest: "where status is Active". Any other operator phrase wins.
    op(&["is"], Operator::Eq),
];

// ── Working state ───────────────────────────────────────────────

struct Work<'t> {
    text: &'t str,
    tokens: Vec<Token>,
    claimed: Vec<bool>,
    params: ParameterSet,
}

/// A resolved column reference in the token stream.
#[derive(Debug, Clone)]
struct Mention {
    column: String,
    first: usize,
    last: usize,
    span: Span,
}

impl Mention {
    fn extracted(&self) -> Extracted<String> {
        Extracted::at(self.column.clone(), self.span)
    }
}

/// Positions recorded by the intent grammar for later column assignment.
#[derive(Debug, Default)]
struct Slots {
    op_at: Option<usize>,
    implied: Option<(&'static str, Span)>,
    null_at: Option<usize>,
    group_at: Option<usize>,
    subset_at: Option<usize>,
    separator_at: Option<usize>,
    all_columns: bool,
}

impl<'t> Work<'t> {
    fn new(text: &'t str, intent: Intent) -> Self {
        let tokens = normalize::lex(text);
        let claimed = vec![false; tokens.len()];
        Self {
            text,
            tokens,
            claimed,
            params: ParameterSet::new(intent),
        }
    }

    fn span(&self, first: usize, last: usize) -> Span {
        Span::new(self.tokens[first].span.start, self.tokens[last].span.end)
    }

    fn claim(&mut self, first: usize, last: usize) {
        for c in &mut self.claimed[first..=last] {
            *c = true;
        }
    }

    fn free(&self, i: usize) -> bool {
        i < self.tokens.len() && !self.claimed[i]
    }

    fn free_word(&self, i: usize) -> bool {
        self.free(i) && self.tokens[i].is_word()
    }

    fn phrase_at(&self, i: usize, words: &[&str]) -> bool {
        words
            .iter()
            .enumerate()
            .all(|(k, w)| self.free(i + k) && self.tokens[i + k].lower == *w)
    }

    /// First free token satisfying `pred`, at or after `from`.
    fn find(&self, from: usize, pred: impl Fn(&Token) -> bool) -> Option<usize> {
        (from..self.tokens.len()).find(|&i| self.free(i) && pred(&self.tokens[i]))
    }

    /// Earliest keyword phrase from `options`; claims it and returns the
    /// index just after.
    fn keyword(&mut self, options: &[&[&str]]) -> Option<usize> {
        for i in 0..self.tokens.len() {
            if let Some(words) = options.iter().find(|o| self.phrase_at(i, o)) {
                let last = i + words.len() - 1;
                self.claim(i, last);
                return Some(last + 1);
            }
        }
        None
    }

    /// Best operator phrase: longest wins, then leftmost; bare `is` only
    /// when nothing else matches.
    fn best_operator(&self) -> Option<(usize, &'static OpPhrase)> {
        let mut best: Option<(usize, &'static OpPhrase)> = None;
        for i in 0..self.tokens.len() {
            for phrase in OPERATORS {
                if !self.phrase_at(i, phrase.words) {
                    continue;
                }
                let rank = |p: &OpPhrase| {
                    if p.words == ["is"] { 0 } else { p.words.len() }
                };
                best = match best {
                    Some((_, b)) if rank(b) >= rank(phrase) => best,
                    _ => Some((i, phrase)),
                };
            }
        }
        best
    }

    /// Read one literal starting at token `i`. Unquoted words run on until a
    /// stop word, a claimed token or a non-word. Returns the literal and the
    /// index of its last token.
    fn literal_at(&self, i: usize) -> Option<(Literal, usize)> {
        if !self.free(i) {
            return None;
        }
        let t = &self.tokens[i];
        let lit = match t.kind {
            TokenKind::Number => t
                .text
                .parse::<i64>()
                .map(Literal::Integer)
                .or_else(|_| t.text.parse::<f64>().map(Literal::Real))
                .ok()?,
            TokenKind::Date => parse_any_date(&t.text)
                .map(Literal::Date)
                .unwrap_or_else(|| Literal::Text(t.text.clone())),
            TokenKind::Quoted | TokenKind::Format => Literal::Text(t.text.clone()),
            TokenKind::Symbol => return None,
            TokenKind::Word => {
                if t.is_any(NULL_WORDS) {
                    Literal::Null
                } else {
                    if VALUE_STOPS.contains(&t.lower.as_str()) {
                        return None;
                    }
                    let mut j = i;
                    while self.free_word(j + 1)
                        && !VALUE_STOPS.contains(&self.tokens[j + 1].lower.as_str())
                    {
                        j += 1;
                    }
                    let span = self.span(i, j);
                    let text = span.slice(self.text).unwrap_or(&t.text).to_string();
                    return Some((Literal::Text(text), j));
                }
            }
        };
        Some((lit, i))
    }

    fn push_value(&mut self, i: usize) -> Option<usize> {
        let (lit, last) = self.literal_at(i)?;
        let span = self.span(i, last);
        self.claim(i, last);
        self.params.values.push(Extracted::at(lit, span));
        Some(last)
    }
}

// ── Extractor ───────────────────────────────────────────────────

/// Schema-aware parameter extractor.
pub struct Extractor {
    vocabulary: BTreeSet<String>,
    stopwords: HashSet<String>,
    max_distance: usize,
    default_table: Option<String>,
}

impl Extractor {
    /// `vocabulary` holds command lemmas (from the classifier) that must
    /// never be fuzzy-matched to a column.
    pub fn new(
        vocabulary: BTreeSet<String>,
        max_distance: usize,
        default_table: Option<String>,
    ) -> Self {
        let stopwords = STOPWORDS.iter().chain(NULL_WORDS).map(|w| lemma(w)).collect();
        Self {
            vocabulary,
            stopwords,
            max_distance,
            default_table,
        }
    }

    pub fn extract(&self, text: &str, intent: Intent, schema: &Schema) -> EngineResult<ParameterSet> {
        let mut w = Work::new(text, intent);
        let tables = NameIndex::new(schema.table_names());

        let Some(table) = self.resolve_table(&mut w, schema, &tables)? else {
            w.params.mark_missing(ParamRole::Table);
            return Ok(w.params);
        };
        let Some(table_schema) = schema.table(&table) else {
            w.params.mark_missing(ParamRole::Table);
            return Ok(w.params);
        };
        let columns = NameIndex::new(table_schema.column_names());

        let slots = grammar(&mut w, intent, &columns);
        let mentions = self.scan_columns(&mut w, &columns, &tables)?;
        assign(&mut w, intent, &slots, &mentions, &columns);
        Ok(w.params)
    }

    fn fuzzy_candidate(&self, t: &Token) -> bool {
        t.is_word()
            && !self.stopwords.contains(&t.lemma)
            && !self.vocabulary.contains(&t.lemma)
            && !t.lower.chars().all(|c| c.is_ascii_digit())
    }

    fn ambiguous(
        &self,
        w: &Work<'_>,
        role: ParamRole,
        word: &str,
        candidates: Vec<String>,
    ) -> EngineError {
        EngineError::ExtractionAmbiguous {
            intent: w.params.intent,
            role,
            word: word.to_string(),
            candidates,
            params: Box::new(w.params.clone()),
        }
    }

    /// Named table (plural form preferred, then leftmost), fuzzy table
    /// name, sole owner of the mentioned columns, configured default, or
    /// the only registered table.
    fn resolve_table(
        &self,
        w: &mut Work<'_>,
        schema: &Schema,
        tables: &NameIndex,
    ) -> EngineResult<Option<String>> {
        let mut best: Option<(bool, usize, usize, String)> = None;
        for i in 0..w.tokens.len() {
            for len in (1..=3).rev() {
                if !(0..len).all(|k| w.free_word(i + k)) {
                    continue;
                }
                let phrase = phrase_text(&w.tokens[i..i + len]);
                if len == 1 && self.stopwords.contains(&w.tokens[i].lemma) {
                    continue;
                }
                if let Some(name) = tables.exact(&phrase) {
                    let strong = phrase.replace('_', " ") == name.to_lowercase().replace('_', " ");
                    let better = match &best {
                        None => true,
                        Some((s, _, _, _)) => strong && !*s,
                    };
                    if better {
                        best = Some((strong, i, i + len - 1, name.to_string()));
                    }
                }
            }
        }
        if let Some((_, first, last, name)) = best {
            let span = w.span(first, last);
            w.claim(first, last);
            w.params.table = Some(Extracted::at(name.clone(), span));
            return Ok(Some(name));
        }

        for i in 0..w.tokens.len() {
            let t = &w.tokens[i];
            if !w.free(i) || !self.fuzzy_candidate(t) || is_any_column(schema, &t.lower) {
                continue;
            }
            match tables.resolve(&t.lower, self.max_distance) {
                Resolution::Exact(name) | Resolution::Fuzzy { name, .. } => {
                    let span = t.span;
                    w.claim(i, i);
                    w.params.table = Some(Extracted::at(name.clone(), span));
                    return Ok(Some(name));
                }
                Resolution::Ambiguous(candidates) => {
                    let word = t.text.clone();
                    return Err(self.ambiguous(w, ParamRole::Table, &word, candidates));
                }
                Resolution::NoMatch => {}
            }
        }

        if let Some((name, span)) = self.owner_of_mentions(w, schema) {
            w.params.table = Some(Extracted::at(name.clone(), span));
            return Ok(Some(name));
        }

        if let Some(default) = &self.default_table {
            if let Some(t) = schema.table(default) {
                w.params.table = Some(Extracted::configured(t.name.clone()));
                return Ok(Some(t.name.clone()));
            }
        }
        if let [only] = schema.tables() {
            w.params.table = Some(Extracted::configured(only.name.clone()));
            return Ok(Some(only.name.clone()));
        }
        Ok(None)
    }

    /// The single table owning every column word in the text, if exactly
    /// one does. Nothing is claimed.
    fn owner_of_mentions(&self, w: &Work<'_>, schema: &Schema) -> Option<(String, Span)> {
        let indexes: Vec<(&TableSchema, NameIndex)> = schema
            .tables()
            .iter()
            .map(|t| (t, NameIndex::new(t.column_names())))
            .collect();
        let mut owners: Option<BTreeSet<String>> = None;
        let mut first_span = None;
        for i in 0..w.tokens.len() {
            let t = &w.tokens[i];
            if !w.free_word(i) || self.stopwords.contains(&t.lemma) {
                continue;
            }
            let exact: BTreeSet<String> = indexes
                .iter()
                .filter(|(_, idx)| idx.exact(&t.lower).is_some())
                .map(|(ts, _)| ts.name.clone())
                .collect();
            let found = if !exact.is_empty() {
                exact
            } else if self.fuzzy_candidate(t) {
                indexes
                    .iter()
                    .filter(|(_, idx)| {
                        !matches!(idx.resolve(&t.lower, self.max_distance), Resolution::NoMatch)
                    })
                    .map(|(ts, _)| ts.name.clone())
                    .collect()
            } else {
                BTreeSet::new()
            };
            if found.is_empty() {
                continue;
            }
            first_span.get_or_insert(t.span);
            owners = Some(match owners {
                None => found,
                Some(prev) => prev.intersection(&found).cloned().collect(),
            });
        }
        let owners = owners?;
        match (owners.len(), first_span) {
            (1, Some(span)) => owners.into_iter().next().map(|n| (n, span)),
            _ => None,
        }
    }

    /// Column mentions among unclaimed words: exact aliases over 3/2/1-word
    /// windows, then fuzzy single words.
    fn scan_columns(
        &self,
        w: &mut Work<'_>,
        columns: &NameIndex,
        tables: &NameIndex,
    ) -> EngineResult<Vec<Mention>> {
        let mut mentions = Vec::new();
        let mut i = 0;
        while i < w.tokens.len() {
            let mut matched = false;
            for len in (1..=3).rev() {
                if !(0..len).all(|k| w.free_word(i + k)) {
                    continue;
                }
                if len == 1 && self.stopwords.contains(&w.tokens[i].lemma) {
                    continue;
                }
                let phrase = phrase_text(&w.tokens[i..i + len]);
                if let Some(name) = columns.exact(&phrase) {
                    let last = i + len - 1;
                    mentions.push(Mention {
                        column: name.to_string(),
                        first: i,
                        last,
                        span: w.span(i, last),
                    });
                    w.claim(i, last);
                    i = last + 1;
                    matched = true;
                    break;
                }
            }
            if !matched {
                i += 1;
            }
        }

        // Other tables named in passing are not column typos.
        for i in 0..w.tokens.len() {
            if w.free_word(i) && tables.exact(&w.tokens[i].lower).is_some() {
                w.claim(i, i);
            }
        }

        for i in 0..w.tokens.len() {
            if !w.free(i) || !self.fuzzy_candidate(&w.tokens[i]) {
                continue;
            }
            let word = w.tokens[i].lower.clone();
            match columns.resolve(&word, self.max_distance) {
                Resolution::Exact(name) | Resolution::Fuzzy { name, .. } => {
                    tracing::debug!(word = %word, column = %name, "fuzzy column match");
                    mentions.push(Mention {
                        column: name,
                        first: i,
                        last: i,
                        span: w.tokens[i].span,
                    });
                    w.claim(i, i);
                }
                Resolution::Ambiguous(candidates) => {
                    let text = w.tokens[i].text.clone();
                    return Err(self.ambiguous(w, ParamRole::Column, &text, candidates));
                }
                Resolution::NoMatch => {}
            }
        }

        mentions.sort_by_key(|m| m.first);
        Ok(mentions)
    }
}

fn phrase_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.lower.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_any_column(schema: &Schema, word: &str) -> bool {
    schema
        .tables()
        .iter()
        .any(|t| NameIndex::new(t.column_names()).exact(word).is_some())
}

// ── Intent grammars ─────────────────────────────────────────────

fn grammar(w: &mut Work<'_>, intent: Intent, columns: &NameIndex) -> Slots {
    let mut slots = Slots::default();
    match intent {
        Intent::FilterRows => predicate(w, &mut slots),
        Intent::Count => {
            slots.group_at = w.keyword(GROUP_KEYWORDS);
            predicate(w, &mut slots);
        }
        Intent::Aggregate => {
            if let Some(i) = w.find(0, |t| aggregate_fn(t).is_some()) {
                if let Some(f) = aggregate_fn(&w.tokens[i]) {
                    let span = w.tokens[i].span;
                    w.claim(i, i);
                    w.params.aggregation = Some(Extracted::at(f, span));
                }
            }
            slots.group_at = w.keyword(GROUP_KEYWORDS);
        }
        Intent::ReplaceValue => replace(w, &mut slots, columns),
        Intent::RenameColumn => rename(w, &mut slots),
        Intent::Standardize => standardize(w),
        Intent::DropDuplicates => slots.subset_at = w.keyword(SUBSET_KEYWORDS),
        Intent::DropMissing => {
            while let Some(i) = w.find(0, |t| t.is_any(NULL_WORDS)) {
                w.claim(i, i);
            }
        }
        Intent::Select => {
            slots.all_columns = w.find(0, |t| t.is_any(ALL_WORDS)).is_some();
            predicate(w, &mut slots);
        }
        Intent::Normalize | Intent::Unknown => {}
    }
    slots
}

fn aggregate_fn(t: &Token) -> Option<AggregateFn> {
    if !t.is_word() {
        return None;
    }
    AGGREGATES
        .iter()
        .find(|(word, _)| t.lemma == lemma(word))
        .map(|(_, f)| *f)
}

/// Claim a negator and the "is"/"are" before it.
fn negation(w: &mut Work<'_>) -> bool {
    let starts_condition = |w: &Work<'_>, i: usize| {
        w.free(i)
            && (w.tokens[i].is_any(NULL_WORDS)
                || OPERATORS
                    .iter()
                    .filter(|p| p.words != ["is"] && p.words[0] != "equal")
                    .any(|p| w.phrase_at(i, p.words)))
    };
    let Some(i) = (0..w.tokens.len()).find(|&i| {
        w.free_word(i)
            && (NEGATORS.contains(&w.tokens[i].lower.as_str())
                || (w.tokens[i].lower == "not" && starts_condition(w, i + 1)))
    }) else {
        return false;
    };
    w.claim(i, i);
    if i > 0 && w.free(i - 1) && w.tokens[i - 1].is_any(&["is", "are"]) {
        w.claim(i - 1, i - 1);
    }
    true
}

/// Operator, operand(s), and the position the predicate column is
/// expected around. Falls back to a bare null word ("missing age").
fn predicate(w: &mut Work<'_>, slots: &mut Slots) {
    let negated = negation(w);
    if let Some((at, phrase)) = w.best_operator() {
        let last = at + phrase.words.len() - 1;
        let span = w.span(at, last);
        w.claim(at, last);
        if at > 0 && w.free(at - 1) && w.tokens[at - 1].is_any(&["is"]) {
            w.claim(at - 1, at - 1);
        }
        slots.op_at = Some(at);
        slots.implied = phrase.implies.map(|c| (c, span));
        w.params.operator = Some(Extracted::at(phrase.op, span));
        if let Some(end) = w.push_value(last + 1) {
            if phrase.op == Operator::Between && w.free(end + 1) && w.tokens[end + 1].lower == "and" {
                w.claim(end + 1, end + 1);
                w.push_value(end + 2);
            }
        }
    } else if let Some(i) = w.find(0, |t| t.is_any(NULL_WORDS)) {
        let span = w.tokens[i].span;
        w.claim(i, i);
        slots.null_at = Some(i);
        w.params.operator = Some(Extracted::at(Operator::Eq, span));
        w.params.values.push(Extracted::at(Literal::Null, span));
    }
    w.params.negated = negated && w.params.operator.is_some();
}

/// `<verb> [missing] [column] <from> <with|to> <replacement> [in <column>]`
fn replace(w: &mut Work<'_>, slots: &mut Slots, columns: &NameIndex) {
    let verb = w.find(0, |t| t.is_any(REPLACE_VERBS));
    let start = verb.map_or(0, |v| v + 1);
    if let Some(v) = verb {
        w.claim(v, v);
    }
    let Some(sep) = w.find(start, |t| t.is_word() && REPLACE_SEPARATORS.contains(&t.lower.as_str()))
    else {
        return;
    };
    w.claim(sep, sep);
    slots.separator_at = Some(sep);

    if let Some((lit, last)) = w.literal_at(sep + 1) {
        let span = w.span(sep + 1, last);
        w.claim(sep + 1, last);
        w.params.replacement = Some(Extracted::at(lit, span));
    }

    // The "from" operand sits between verb and separator, minus column
    // words and filler.
    let mut operand: Vec<usize> = Vec::new();
    for i in start..sep {
        if !w.free(i) {
            continue;
        }
        let t = &w.tokens[i];
        if t.is_any(NULL_WORDS) {
            let span = t.span;
            w.claim(i, i);
            w.params.values.push(Extracted::at(Literal::Null, span));
            return;
        }
        let is_column = t.is_word()
            && (columns.exact(&t.lower).is_some()
                || (w.free_word(i + 1)
                    && columns
                        .exact(&format!("{} {}", t.lower, w.tokens[i + 1].lower))
                        .is_some())
                || (i > 0
                    && w.free_word(i - 1)
                    && columns
                        .exact(&format!("{} {}", w.tokens[i - 1].lower, t.lower))
                        .is_some()));
        let filler = t.is_word() && STOPWORDS.iter().any(|s| lemma(s) == t.lemma);
        if !is_column && !filler {
            operand.push(i);
        }
    }
    match operand.as_slice() {
        [] => {}
        [only] => {
            let only = *only;
            if let Some((lit, _)) = w.literal_at(only) {
                let span = w.tokens[only].span;
                let lit = match lit {
                    Literal::Text(_) if w.tokens[only].is_word() => {
                        Literal::Text(w.tokens[only].text.clone())
                    }
                    other => other,
                };
                w.claim(only, only);
                w.params.values.push(Extracted::at(lit, span));
            }
        }
        [first, .., last] => {
            let (first, last) = (*first, *last);
            let span = w.span(first, last);
            let text = span.slice(w.text).unwrap_or_default().to_string();
            for &i in &operand {
                w.claim(i, i);
            }
            w.params.values.push(Extracted::at(Literal::Text(text), span));
        }
    }
}

/// `rename <column> <to|as> <new name>`
fn rename(w: &mut Work<'_>, slots: &mut Slots) {
    let verb = w.find(0, |t| t.is_any(RENAME_VERBS));
    if let Some(v) = verb {
        w.claim(v, v);
    }
    let start = verb.map_or(0, |v| v + 1);
    let Some(sep) = w.find(start, |t| t.is_word() && RENAME_SEPARATORS.contains(&t.lower.as_str()))
    else {
        return;
    };
    w.claim(sep, sep);
    slots.separator_at = Some(sep);
    let next = sep + 1;
    if w.free(next) && matches!(w.tokens[next].kind, TokenKind::Word | TokenKind::Quoted) {
        let t = &w.tokens[next];
        let new_name = Extracted::at(t.text.clone(), t.span);
        w.claim(next, next);
        w.params.new_name = Some(new_name);
    }
}

/// A format pattern token, a quoted pattern after "to"/"as", or "ISO".
fn standardize(w: &mut Work<'_>) {
    let at = w
        .find(0, |t| t.kind == TokenKind::Format)
        .or_else(|| {
            (1..w.tokens.len()).find(|&i| {
                w.free(i)
                    && w.tokens[i].kind == TokenKind::Quoted
                    && FORMAT_INTRODUCERS.contains(&w.tokens[i - 1].lower.as_str())
            })
        })
        .or_else(|| w.find(0, |t| t.is_word() && FORMAT_WORDS.contains(&t.lower.as_str())));
    if let Some(i) = at {
        let t = &w.tokens[i];
        let target = Extracted::at(t.text.clone(), t.span);
        w.claim(i, i);
        w.params.target_format = Some(target);
    }
}

// ── Role assignment ─────────────────────────────────────────────

fn assign(w: &mut Work<'_>, intent: Intent, slots: &Slots, mentions: &[Mention], columns: &NameIndex) {
    let group = slots
        .group_at
        .and_then(|g| mentions.iter().find(|m| m.first >= g));
    let others: Vec<&Mention> = mentions
        .iter()
        .filter(|m| group.is_none_or(|g| g.first != m.first))
        .collect();

    // A condition turns a projection into a filter over the same columns.
    let intent = match intent {
        Intent::Select if w.params.operator.is_some() => {
            tracing::debug!("select carries a condition; extracting as filter");
            w.params.intent = Intent::FilterRows;
            Intent::FilterRows
        }
        other => other,
    };

    match intent {
        Intent::FilterRows | Intent::Count => {
            let has_predicate = w.params.operator.is_some();
            if has_predicate {
                match predicate_column(slots, &others, columns) {
                    Some((col, clause_at)) => {
                        w.params.columns.push(col);
                        if intent == Intent::FilterRows {
                            w.params.projection = others
                                .iter()
                                .filter(|m| m.last < clause_at)
                                .map(|m| m.extracted())
                                .collect();
                        }
                    }
                    None => w.params.mark_missing(ParamRole::Column),
                }
                let needed = match w.params.operator.as_ref().map(|o| o.value) {
                    Some(Operator::Between) => 2,
                    _ => 1,
                };
                if w.params.values.len() < needed {
                    w.params.mark_missing(ParamRole::Value);
                }
            } else if intent == Intent::FilterRows {
                match others.first() {
                    Some(m) => w.params.columns.push(m.extracted()),
                    None => w.params.mark_missing(ParamRole::Column),
                }
                w.params.mark_missing(ParamRole::Operator);
                w.params.mark_missing(ParamRole::Value);
            }
            if intent == Intent::Count {
                set_group(w, slots, group);
            }
        }
        Intent::Aggregate => {
            if w.params.aggregation.is_none() {
                w.params.mark_missing(ParamRole::AggregationFn);
            }
            push_all(w, &others);
            set_group(w, slots, group);
        }
        Intent::ReplaceValue => {
            push_all(w, &others);
            if w.params.values.is_empty() {
                w.params.mark_missing(ParamRole::Value);
            }
            if w.params.replacement.is_none() {
                w.params.mark_missing(ParamRole::Replacement);
            }
        }
        Intent::RenameColumn => {
            let before: Vec<&Mention> = match slots.separator_at {
                Some(sep) => others.iter().copied().filter(|m| m.last < sep).collect(),
                None => others.clone(),
            };
            push_all(w, &before);
            if w.params.new_name.is_none() {
                w.params.mark_missing(ParamRole::NewName);
            }
        }
        Intent::Standardize => {
            push_all(w, &others);
            if w.params.target_format.is_none() {
                w.params.mark_missing(ParamRole::TargetFormat);
            }
        }
        Intent::DropDuplicates => {
            let subset: Vec<&Mention> = match slots.subset_at {
                Some(s) => others.iter().copied().filter(|m| m.first >= s).collect(),
                None => others.clone(),
            };
            for m in subset {
                w.params.columns.push(m.extracted());
            }
        }
        Intent::DropMissing => {
            for m in &others {
                w.params.columns.push(m.extracted());
            }
        }
        Intent::Select => {
            for m in &others {
                w.params.columns.push(m.extracted());
            }
            if others.is_empty() && !slots.all_columns {
                w.params.mark_missing(ParamRole::Column);
            }
        }
        Intent::Normalize => push_all(w, &others),
        Intent::Unknown => {}
    }
}

/// Push every mention; mark the column missing when there is none.
fn push_all(w: &mut Work<'_>, mentions: &[&Mention]) {
    if mentions.is_empty() {
        w.params.mark_missing(ParamRole::Column);
    }
    for m in mentions {
        w.params.columns.push(m.extracted());
    }
}

fn set_group(w: &mut Work<'_>, slots: &Slots, group: Option<&Mention>) {
    match (slots.group_at, group) {
        (Some(_), Some(m)) => w.params.group_by = Some(m.extracted()),
        (Some(_), None) => w.params.mark_missing(ParamRole::GroupBy),
        (None, _) => {}
    }
}

/// The column a predicate tests and the token index its clause starts at.
///
/// A column implied by the operator phrase wins, then the nearest mention
/// before the operator, then the first after it. For a bare null word the
/// mention right after it wins ("missing age").
fn predicate_column(
    slots: &Slots,
    mentions: &[&Mention],
    columns: &NameIndex,
) -> Option<(Extracted<String>, usize)> {
    if let Some(n) = slots.null_at {
        return mentions
            .iter()
            .find(|m| m.first > n)
            .map(|m| (m.extracted(), n))
            .or_else(|| {
                mentions
                    .iter()
                    .rev()
                    .find(|m| m.last < n)
                    .map(|m| (m.extracted(), m.first))
            });
    }
    let at = slots.op_at?;
    if let Some((implied, span)) = slots.implied {
        if let Some(name) = columns.exact(implied) {
            return Some((Extracted::at(name.to_string(), span), at));
        }
    }
    if let Some(m) = mentions.iter().rev().find(|m| m.last < at) {
        return Some((m.extracted(), m.first));
    }
    mentions
        .iter()
        .find(|m| m.first > at)
        .map(|m| (m.extracted(), at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;
    use cq_protocol::{ColumnDef, ColumnType, SemanticRole, TableSchema};

    fn schema() -> Schema {
        let mut s = Schema::new();
        s.register(
            TableSchema::new(
                "patients",
                vec![
                    ColumnDef::new("patient_id", ColumnType::Text, SemanticRole::Identifier),
                    ColumnDef::new("site_id", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("age", ColumnType::Real, SemanticRole::Measurement),
                    ColumnDef::new("gender", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("blood_type", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("enrollment_date", ColumnType::Date, SemanticRole::Timestamp),
                    ColumnDef::new("treatment_arm", ColumnType::Text, SemanticRole::Category),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        s.register(
            TableSchema::new(
                "adverse_events",
                vec![
                    ColumnDef::new("event_id", ColumnType::Integer, SemanticRole::Identifier),
                    ColumnDef::new("patient_id", ColumnType::Text, SemanticRole::Identifier),
                    ColumnDef::new("severity", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("event_date", ColumnType::Date, SemanticRole::Timestamp),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        s
    }

    fn extractor() -> Extractor {
        Extractor::new(IntentClassifier::new(0.35).vocabulary(), 2, None)
    }

    fn extract(text: &str, intent: Intent) -> ParameterSet {
        extractor().extract(text, intent, &schema()).unwrap()
    }

    fn columns(p: &ParameterSet) -> Vec<&str> {
        p.column_names()
    }

    // ── Tables ──────────────────────────────────────────────────

    #[test]
    fn table_by_name_with_span() {
        let text = "Count adverse events by severity";
        let p = extract(text, Intent::Count);
        let table = p.table.as_ref().unwrap();
        assert_eq!(table.value, "adverse_events");
        assert_eq!(table.span.unwrap().slice(text), Some("adverse events"));
    }

    #[test]
    fn plural_table_beats_singular_alias() {
        let p = extract("for each patient count adverse events", Intent::Count);
        assert_eq!(p.table_name(), Some("adverse_events"));
        assert_eq!(p.group_by.as_ref().unwrap().value, "patient_id");
    }

    #[test]
    fn table_inferred_from_column_owner() {
        let p = extract("Filter by blood_typ", Intent::FilterRows);
        assert_eq!(p.table_name(), Some("patients"));
    }

    #[test]
    fn no_table_is_incomplete() {
        let p = extract("Normalize the thing", Intent::Normalize);
        assert_eq!(p.missing, vec![ParamRole::Table]);
    }

    #[test]
    fn default_table_is_configured() {
        let ex = Extractor::new(BTreeSet::new(), 2, Some("patients".into()));
        let p = ex
            .extract("Normalize patient_id", Intent::Normalize, &schema())
            .unwrap();
        let table = p.table.unwrap();
        assert_eq!(table.value, "patients");
        assert!(table.span.is_none());
    }

    // ── Predicates ──────────────────────────────────────────────

    #[test]
    fn older_than_implies_age() {
        let text = "Show patients older than 60";
        let p = extract(text, Intent::FilterRows);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.operator.as_ref().unwrap().value, Operator::Gt);
        assert_eq!(p.values[0].value, Literal::Integer(60));
        assert_eq!(p.values[0].span.unwrap().slice(text), Some("60"));
    }

    #[test]
    fn symbolic_operator_with_column() {
        let p = extract("patients where age >= 40.5", Intent::FilterRows);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.operator.unwrap().value, Operator::Ge);
        assert_eq!(p.values[0].value, Literal::Real(40.5));
    }

    #[test]
    fn between_takes_two_values() {
        let p = extract("patients with age between 40 and 50", Intent::FilterRows);
        assert!(p.is_complete());
        assert_eq!(p.operator.unwrap().value, Operator::Between);
        let vals: Vec<&Literal> = p.values.iter().map(|v| &v.value).collect();
        assert_eq!(vals, [&Literal::Integer(40), &Literal::Integer(50)]);
    }

    #[test]
    fn is_with_text_value() {
        let p = extract("show patients where treatment arm is Drug A 10mg", Intent::FilterRows);
        assert_eq!(columns(&p), ["treatment_arm"]);
        assert_eq!(p.operator.unwrap().value, Operator::Eq);
        assert_eq!(p.values[0].value, Literal::Text("Drug A 10mg".into()));
    }

    #[test]
    fn is_missing_is_null_value() {
        let p = extract("patients where age is missing", Intent::FilterRows);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.values[0].value, Literal::Null);
    }

    #[test]
    fn date_operand() {
        let p = extract("patients with enrollment date after 2024-03-01", Intent::FilterRows);
        assert_eq!(columns(&p), ["enrollment_date"]);
        assert!(matches!(p.values[0].value, Literal::Date(_)));
    }

    #[test]
    fn typo_resolves_but_filter_stays_incomplete() {
        let p = extract("Filter by blood_typ", Intent::FilterRows);
        assert_eq!(columns(&p), ["blood_type"]);
        assert!(p.missing.contains(&ParamRole::Operator));
        assert!(p.missing.contains(&ParamRole::Value));
    }

    #[test]
    fn not_before_operator_negates() {
        let text = "Show patients not older than 60";
        let p = extract(text, Intent::FilterRows);
        assert!(p.is_complete());
        assert!(p.negated);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.operator.as_ref().unwrap().value, Operator::Gt);
        assert_eq!(p.values[0].value, Literal::Integer(60));

        let p = extract("patients whose age is not between 40 and 50", Intent::FilterRows);
        assert!(p.negated);
        assert_eq!(p.operator.unwrap().value, Operator::Between);
        assert_eq!(p.values.len(), 2);
    }

    #[test]
    fn excluding_negates_the_condition() {
        let p = extract("patients excluding those with missing age", Intent::FilterRows);
        assert!(p.negated);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.values[0].value, Literal::Null);

        let p = extract(
            "patients except those with enrollment date after 2024-03-01",
            Intent::FilterRows,
        );
        assert!(p.negated);
        assert_eq!(columns(&p), ["enrollment_date"]);
        assert_eq!(p.operator.unwrap().value, Operator::Gt);
    }

    #[test]
    fn is_not_stays_inequality() {
        let p = extract("patients where gender is not 'Female'", Intent::FilterRows);
        assert!(!p.negated);
        assert_eq!(columns(&p), ["gender"]);
        assert_eq!(p.operator.unwrap().value, Operator::Ne);

        let p = extract("patients where age is not equal to 45", Intent::FilterRows);
        assert!(!p.negated);
        assert_eq!(p.operator.unwrap().value, Operator::Ne);

        let p = extract("patients with gender other than 'Male'", Intent::FilterRows);
        assert!(!p.negated);
        assert_eq!(p.operator.unwrap().value, Operator::Ne);
        assert_eq!(p.values[0].value, Literal::Text("Male".into()));
    }

    #[test]
    fn select_with_condition_becomes_filter() {
        let p = extract("Display patients whose gender is 'F'", Intent::Select);
        assert_eq!(p.intent, Intent::FilterRows);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["gender"]);
        assert_eq!(p.operator.as_ref().unwrap().value, Operator::Eq);
        assert!(p.projection.is_empty());

        let p = extract("Show patient_id where age is missing", Intent::Select);
        assert_eq!(p.intent, Intent::FilterRows);
        assert_eq!(columns(&p), ["age"]);
        let shown: Vec<&str> = p.projection.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(shown, ["patient_id"]);
    }

    #[test]
    fn filter_keeps_columns_named_before_the_condition() {
        let p = extract("Show patient_id and age of patients older than 60", Intent::FilterRows);
        assert_eq!(columns(&p), ["age"]);
        let shown: Vec<&str> = p.projection.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(shown, ["patient_id", "age"]);
    }

    // ── Count / Aggregate ───────────────────────────────────────

    #[test]
    fn count_per_site() {
        let p = extract("How many patients per site?", Intent::Count);
        assert!(p.is_complete());
        assert!(p.operator.is_none());
        assert_eq!(p.group_by.unwrap().value, "site_id");
    }

    #[test]
    fn count_with_missing_column() {
        let p = extract("how many patients have missing age", Intent::Count);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.values[0].value, Literal::Null);
    }

    #[test]
    fn aggregate_with_group() {
        let p = extract("What is the average age by treatment arm", Intent::Aggregate);
        assert!(p.is_complete());
        assert_eq!(p.aggregation.as_ref().unwrap().value, AggregateFn::Mean);
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.group_by.unwrap().value, "treatment_arm");
    }

    // ── Destructive intents ─────────────────────────────────────

    #[test]
    fn drop_missing_column() {
        let p = extract("Remove rows where age is missing", Intent::DropMissing);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["age"]);
    }

    #[test]
    fn replace_quoted_values() {
        let p = extract("Replace 'M' with 'Male' in gender", Intent::ReplaceValue);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["gender"]);
        assert_eq!(p.values[0].value, Literal::Text("M".into()));
        assert_eq!(p.replacement.unwrap().value, Literal::Text("Male".into()));
    }

    #[test]
    fn replace_column_first() {
        let p = extract("Change gender M to Male", Intent::ReplaceValue);
        assert_eq!(columns(&p), ["gender"]);
        assert_eq!(p.values[0].value, Literal::Text("M".into()));
        assert_eq!(p.replacement.unwrap().value, Literal::Text("Male".into()));
    }

    #[test]
    fn fill_missing() {
        let p = extract("fill missing age with 50", Intent::ReplaceValue);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.values[0].value, Literal::Null);
        assert_eq!(p.replacement.unwrap().value, Literal::Integer(50));
    }

    #[test]
    fn replace_without_replacement_is_incomplete() {
        let p = extract("Replace 'M' in gender", Intent::ReplaceValue);
        assert!(p.missing.contains(&ParamRole::Replacement));
    }

    #[test]
    fn rename_takes_raw_new_name() {
        let p = extract("Rename age to Age_Years", Intent::RenameColumn);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["age"]);
        assert_eq!(p.new_name.unwrap().value, "Age_Years");
    }

    #[test]
    fn standardize_format() {
        let p = extract("Standardize enrollment_date to YYYY-MM-DD", Intent::Standardize);
        assert!(p.is_complete());
        assert_eq!(columns(&p), ["enrollment_date"]);
        assert_eq!(p.target_format.unwrap().value, "YYYY-MM-DD");
    }

    #[test]
    fn dedupe_subset() {
        let p = extract("Remove duplicate patients based on patient_id", Intent::DropDuplicates);
        assert_eq!(columns(&p), ["patient_id"]);
        let all = extract("Remove duplicate patients", Intent::DropDuplicates);
        assert!(all.columns.is_empty());
        assert!(all.is_complete());
    }

    #[test]
    fn select_lists_columns() {
        let p = extract("Show patient_id and age from patients", Intent::Select);
        assert_eq!(columns(&p), ["patient_id", "age"]);
        let all = extract("show all patients", Intent::Select);
        assert!(all.is_complete());
        let none = extract("show patients", Intent::Select);
        assert!(none.missing.contains(&ParamRole::Column));
    }

    // ── Ambiguity ───────────────────────────────────────────────

    #[test]
    fn equidistant_columns_are_ambiguous() {
        let mut s = Schema::new();
        s.register(
            TableSchema::new(
                "doses",
                vec![
                    ColumnDef::new("dose_am", ColumnType::Real, SemanticRole::Measurement),
                    ColumnDef::new("dose_pm", ColumnType::Real, SemanticRole::Measurement),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        let err = extractor()
            .extract("Normalize dose_xm", Intent::Normalize, &s)
            .unwrap_err();
        match err {
            EngineError::ExtractionAmbiguous {
                role, candidates, ..
            } => {
                assert_eq!(role, ParamRole::Column);
                assert_eq!(candidates, vec!["dose_am".to_string(), "dose_pm".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
