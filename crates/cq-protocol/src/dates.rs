//! Allow-listed date patterns used by `Standardize` and date comparisons.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `2024-03-15`
    Iso,
    /// `15/03/2024`
    DayMonthYearSlash,
    /// `03/15/2024`
    MonthDayYearSlash,
    /// `15-03-2024`
    DayMonthYearDash,
    /// `2024/03/15`
    YearMonthDaySlash,
    /// `15 Mar 2024`
    DayMonthNameYear,
}

impl DateFormat {
    /// Order matters for parsing ambiguous strings: ISO and day-first win
    /// over month-first.
    pub const ALL: [DateFormat; 6] = [
        DateFormat::Iso,
        DateFormat::YearMonthDaySlash,
        DateFormat::DayMonthYearSlash,
        DateFormat::MonthDayYearSlash,
        DateFormat::DayMonthYearDash,
        DateFormat::DayMonthNameYear,
    ];

    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Iso => "%Y-%m-%d",
            Self::DayMonthYearSlash => "%d/%m/%Y",
            Self::MonthDayYearSlash => "%m/%d/%Y",
            Self::DayMonthYearDash => "%d-%m-%Y",
            Self::YearMonthDaySlash => "%Y/%m/%d",
            Self::DayMonthNameYear => "%d %b %Y",
        }
    }

    /// Resolve a user-facing name (`YYYY-MM-DD`, `iso`, `dd/mm/yyyy`) or a raw
    /// strftime pattern from the allow-list.
    pub fn from_alias(alias: &str) -> Option<Self> {
        let a = alias.trim().trim_matches(|c| c == '"' || c == '\'');
        let upper = a.to_ascii_uppercase();
        match upper.as_str() {
            "ISO" | "ISO8601" | "ISO-8601" | "YYYY-MM-DD" => Some(Self::Iso),
            "DD/MM/YYYY" => Some(Self::DayMonthYearSlash),
            "MM/DD/YYYY" => Some(Self::MonthDayYearSlash),
            "DD-MM-YYYY" => Some(Self::DayMonthYearDash),
            "YYYY/MM/DD" => Some(Self::YearMonthDaySlash),
            "DD MON YYYY" => Some(Self::DayMonthNameYear),
            _ => Self::ALL.into_iter().find(|f| f.pattern() == a),
        }
    }

    pub fn format(&self, date: NaiveDate) -> String {
        date.format(self.pattern()).to_string()
    }

    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(text.trim(), self.pattern()).ok()
    }
}

impl std::fmt::Display for DateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.pattern())
    }
}

/// Parse a date written in any allow-listed pattern.
pub fn parse_any_date(text: &str) -> Option<NaiveDate> {
    DateFormat::ALL.iter().find_map(|f| f.parse(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(DateFormat::from_alias("YYYY-MM-DD"), Some(DateFormat::Iso));
        assert_eq!(DateFormat::from_alias("iso"), Some(DateFormat::Iso));
        assert_eq!(
            DateFormat::from_alias("dd/mm/yyyy"),
            Some(DateFormat::DayMonthYearSlash)
        );
        assert_eq!(
            DateFormat::from_alias("%m/%d/%Y"),
            Some(DateFormat::MonthDayYearSlash)
        );
        assert_eq!(DateFormat::from_alias("%H:%M"), None);
    }

    #[test]
    fn parse_any_prefers_day_first() {
        let d = parse_any_date("03/04/2024").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
    }

    #[test]
    fn parse_any_handles_month_names() {
        let d = parse_any_date("15 Mar 2024").unwrap();
        assert_eq!(DateFormat::Iso.format(d), "2024-03-15");
    }

    #[test]
    fn garbage_is_not_a_date() {
        assert!(parse_any_date("next tuesday").is_none());
        assert!(parse_any_date("2024-13-40").is_none());
    }
}
