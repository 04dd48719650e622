use serde::{Deserialize, Serialize};

/// Outcome of running a plan through the safety policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Approved,
    Rejected { reason: String },
    NeedsConfirmation { reason: String },
}

impl ValidationVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn needs_confirmation(reason: impl Into<String>) -> Self {
        Self::NeedsConfirmation {
            reason: reason.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Approved => None,
            Self::Rejected { reason } | Self::NeedsConfirmation { reason } => Some(reason),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected { .. } => "rejected",
            Self::NeedsConfirmation { .. } => "needs_confirmation",
        }
    }
}
