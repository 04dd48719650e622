//! Input screening ahead of classification.
//!
//! Instructions are natural language. Anything that smuggles backend query
//! syntax is refused outright instead of being passed on for translation.

use std::sync::LazyLock;

use regex::Regex;

/// Longest instruction accepted, in characters.
pub const MAX_INSTRUCTION_CHARS: usize = 1000;

pub const RAW_QUERY_REASON: &str = "raw query syntax is not accepted";

static RAW_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b drop \s+ (?:table|database|schema|index|view) \b
        | \b delete \s+ from \b
        | \b insert \s+ into \b
        | \b update \s+ \w+ \s+ set \b
        | \b alter \s+ table \b
        | \b truncate (?:\s+ table)? \b
        | \b create \s+ (?:table|database|index|view) \b
        | \b union \s+ (?:all \s+)? select \b
        | ;
        | --
        | /\*
        ",
    )
    .unwrap()
});

/// Check raw text before it reaches the classifier. `Err` carries the
/// rejection reason.
pub fn screen(text: &str) -> Result<(), String> {
    let chars = text.chars().count();
    if chars > MAX_INSTRUCTION_CHARS {
        return Err(format!(
            "instruction is {chars} characters; the limit is {MAX_INSTRUCTION_CHARS}"
        ));
    }
    if RAW_QUERY.is_match(text) {
        return Err(RAW_QUERY_REASON.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_instructions_pass() {
        for text in [
            "Remove rows where age is missing",
            "Show patients older than 60",
            "Select patient_id and age from patients",
            "Delete duplicate patients",
            "update the gender column: replace M with Male",
            "",
        ] {
            assert_eq!(screen(text), Ok(()), "{text}");
        }
    }

    #[test]
    fn embedded_sql_is_rejected() {
        for text in [
            "DROP TABLE patients",
            "show patients; delete from patients",
            "delete from patients where age > 60",
            "UPDATE patients SET age = 0",
            "show patients -- and everything else",
            "insert into visits values (1)",
            "truncate patients",
        ] {
            assert_eq!(screen(text), Err(RAW_QUERY_REASON.to_string()), "{text}");
        }
    }

    #[test]
    fn oversized_input_is_rejected() {
        let text = "show patients ".repeat(100);
        let err = screen(&text).unwrap_err();
        assert!(err.contains("limit is 1000"));
    }
}
