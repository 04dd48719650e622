//! Text normalization: lexing, case-folding, lemmatization and n-gram
//! features shared by the classifier and the extractor.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use cq_protocol::Span;
use regex::Regex;

/// Lexical grammar. Alternatives are tried left to right at each position,
/// so dates and format patterns win over bare numbers.
static LEXER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        (?P<quoted>"[^"]*"|'[^']*')
        | (?P<date>
            \d{4}[-/]\d{1,2}[-/]\d{1,2}
          | \d{1,2}[-/]\d{1,2}[-/]\d{4}
          | \d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+\d{4})
        | (?P<format>
            %[a-z](?:[-/\ ]%[a-z])+
          | (?:yyyy|dd|mm)(?:[-/\ ](?:yyyy|dd|mm|mon))+)
        | (?P<alnum>\d+[a-z_][a-z0-9_]*)
        | (?P<number>-?\d+(?:\.\d+)?)
        | (?P<symbol>>=|<=|!=|<>|==|>|<|=)
        | (?P<word>[a-z_][a-z0-9_]*(?:'[a-z]+)?)
        "#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Number,
    Date,
    Quoted,
    Format,
    Symbol,
}

/// One lexeme with its position in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original text; for quoted strings, the content without quotes.
    pub text: String,
    pub lower: String,
    pub lemma: String,
    pub span: Span,
}

impl Token {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    /// Whether this is a plain word whose lemma is one of `lemmas`.
    pub fn is_any(&self, lemmas: &[&str]) -> bool {
        self.is_word() && lemmas.iter().any(|l| self.lemma == lemma(l))
    }
}

/// Split text into tokens. Punctuation outside the grammar is dropped.
pub fn lex(text: &str) -> Vec<Token> {
    LEXER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let span = Span::new(whole.start(), whole.end());
            let (kind, raw) = if let Some(m) = caps.name("quoted") {
                let s = m.as_str();
                (TokenKind::Quoted, &s[1..s.len() - 1])
            } else if caps.name("date").is_some() {
                (TokenKind::Date, whole.as_str())
            } else if caps.name("format").is_some() {
                (TokenKind::Format, whole.as_str())
            } else if caps.name("number").is_some() {
                (TokenKind::Number, whole.as_str())
            } else if caps.name("symbol").is_some() {
                (TokenKind::Symbol, whole.as_str())
            } else {
                (TokenKind::Word, whole.as_str())
            };
            let lower = raw.to_lowercase();
            let lemma = match kind {
                TokenKind::Word => lemma(&lower),
                _ => lower.clone(),
            };
            Some(Token {
                kind,
                text: raw.to_string(),
                lower,
                lemma,
                span,
            })
        })
        .collect()
}

const IRREGULAR: &[(&str, &str)] = &[
    ("is", "be"),
    ("are", "be"),
    ("was", "be"),
    ("were", "be"),
    ("has", "have"),
    ("had", "have"),
    ("data", "data"),
    ("this", "this"),
    ("these", "this"),
    ("standardise", "standardize"),
    ("standardised", "standardize"),
    ("normalise", "normalize"),
    ("normalised", "normalize"),
    ("avg", "average"),
    ("dupes", "duplicate"),
    ("dups", "duplicate"),
];

/// Crude suffix-stripping lemmatizer. It is applied identically to
/// instruction text and to classifier vocabulary, so only consistency
/// matters, not linguistic accuracy.
pub fn lemma(word: &str) -> String {
    let w = word.to_lowercase();
    let w = w.strip_suffix("'s").unwrap_or(&w).to_string();
    if let Some((_, to)) = IRREGULAR.iter().find(|(from, _)| *from == w) {
        return lemma_tail(to);
    }
    let stem = if w.len() > 4 && w.ends_with("ies") {
        format!("{}y", &w[..w.len() - 3])
    } else if w.ends_with("sses") {
        w[..w.len() - 2].to_string()
    } else if w.len() > 5 && w.ends_with("ing") {
        w[..w.len() - 3].to_string()
    } else if w.len() > 4 && w.ends_with("ed") {
        w[..w.len() - 2].to_string()
    } else if w.len() > 3
        && w.ends_with('s')
        && !w.ends_with("ss")
        && !w.ends_with("us")
        && !w.ends_with("is")
    {
        w[..w.len() - 1].to_string()
    } else {
        w
    };
    lemma_tail(&stem)
}

fn lemma_tail(stem: &str) -> String {
    let mut s = stem.to_string();
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n > 3 && bytes[n - 1] == bytes[n - 2] && !b"aeioulsz".contains(&bytes[n - 1]) {
        s.pop();
    }
    if s.len() > 4 && s.ends_with('e') {
        s.pop();
    }
    s
}

/// Feature string of a token for bag-of-features scoring.
pub fn feature(token: &Token) -> String {
    match token.kind {
        TokenKind::Word => token.lemma.clone(),
        TokenKind::Number => "<num>".into(),
        TokenKind::Date => "<date>".into(),
        TokenKind::Quoted => "<text>".into(),
        TokenKind::Format => "<format>".into(),
        TokenKind::Symbol => token.lower.clone(),
    }
}

/// Unigram and bigram features of the text.
pub fn features(tokens: &[Token]) -> BTreeSet<String> {
    let unigrams: Vec<String> = tokens.iter().map(feature).collect();
    let mut out: BTreeSet<String> = unigrams.iter().cloned().collect();
    for pair in unigrams.windows(2) {
        out.insert(format!("{} {}", pair[0], pair[1]));
    }
    out
}

/// Normalize a vocabulary phrase ("how many", "older than") into the same
/// feature space produced by `features`.
pub fn phrase_feature(phrase: &str) -> String {
    lex(phrase)
        .iter()
        .map(feature)
        .collect::<Vec<_>>()
        .join(" ")
}
