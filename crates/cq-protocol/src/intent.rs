use serde::{Deserialize, Serialize};

/// The closed set of operations an instruction can request.
///
/// `Unknown` is terminal: it never compiles to an operation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DropMissing,
    ReplaceValue,
    FilterRows,
    Standardize,
    RenameColumn,
    DropDuplicates,
    Aggregate,
    Normalize,
    Select,
    Count,
    Unknown,
}

impl Intent {
    /// Every intent that can compile to a plan.
    pub const SUPPORTED: [Intent; 10] = [
        Intent::DropMissing,
        Intent::ReplaceValue,
        Intent::FilterRows,
        Intent::Standardize,
        Intent::RenameColumn,
        Intent::DropDuplicates,
        Intent::Aggregate,
        Intent::Normalize,
        Intent::Select,
        Intent::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropMissing => "drop_missing",
            Self::ReplaceValue => "replace_value",
            Self::FilterRows => "filter_rows",
            Self::Standardize => "standardize",
            Self::RenameColumn => "rename_column",
            Self::DropDuplicates => "drop_duplicates",
            Self::Aggregate => "aggregate",
            Self::Normalize => "normalize",
            Self::Select => "select",
            Self::Count => "count",
            Self::Unknown => "unknown",
        }
    }

    /// Whether plans for this intent mutate or remove data in place.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::DropMissing
                | Self::ReplaceValue
                | Self::RenameColumn
                | Self::DropDuplicates
                | Self::Standardize
                | Self::Normalize
        )
    }

    /// Tie-break rank for the classifier; lower wins. Read-only intents
    /// rank before destructive ones so a tie never picks a mutation.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Select => 0,
            Self::FilterRows => 1,
            Self::Count => 2,
            Self::Aggregate => 3,
            Self::Standardize => 4,
            Self::Normalize => 5,
            Self::RenameColumn => 6,
            Self::ReplaceValue => 7,
            Self::DropDuplicates => 8,
            Self::DropMissing => 9,
            Self::Unknown => u8::MAX,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
