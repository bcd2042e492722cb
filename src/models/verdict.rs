use serde::{Deserialize, Serialize};
use std::sync::Arc;
use super::example::Example;
use super::outcome::ExecutionOutcome;
use crate::oracle::OracleTrace;

/// The harness's classification of an example after running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Intended vulnerable and the oracle matched.
    ConfirmedVulnerable,
    /// Intended mitigated and the oracle matched.
    ConfirmedMitigated,
    /// Illustrative and the oracle matched.
    ConfirmedIllustrative,
    /// The oracle did not match. Never flipped to the opposite intent.
    Inconclusive,
    /// Infrastructure fault or cancellation; the example was not observed.
    HarnessError,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::ConfirmedVulnerable,
        Classification::ConfirmedMitigated,
        Classification::ConfirmedIllustrative,
        Classification::Inconclusive,
        Classification::HarnessError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmedVulnerable => "confirmed-vulnerable",
            Self::ConfirmedMitigated => "confirmed-mitigated",
            Self::ConfirmedIllustrative => "confirmed-illustrative",
            Self::Inconclusive => "inconclusive",
            Self::HarnessError => "harness-error",
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            Self::ConfirmedVulnerable | Self::ConfirmedMitigated | Self::ConfirmedIllustrative
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone)]
pub struct Verdict {
    pub example: Arc<Example>,
    pub classification: Classification,
    /// Absent for harness errors, where no outcome was evaluated.
    pub trace: Option<OracleTrace>,
    pub outcome: Option<ExecutionOutcome>,
    /// Why a harness error happened.
    pub reason: Option<String>,
}

impl Verdict {
    pub fn harness_error(example: Arc<Example>, reason: impl Into<String>) -> Self {
        Self {
            example,
            classification: Classification::HarnessError,
            trace: None,
            outcome: None,
            reason: Some(reason.into()),
        }
    }

    pub fn cancelled(example: Arc<Example>) -> Self {
        Self::harness_error(example, CANCELLED_REASON)
    }

    pub fn is_cancelled(&self) -> bool {
        self.classification == Classification::HarnessError
            && self.reason.as_deref() == Some(CANCELLED_REASON)
    }

    pub fn id(&self) -> &str {
        &self.example.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_confirmed() {
        assert!(Classification::ConfirmedVulnerable.is_confirmed());
        assert!(Classification::ConfirmedMitigated.is_confirmed());
        assert!(Classification::ConfirmedIllustrative.is_confirmed());
        assert!(!Classification::Inconclusive.is_confirmed());
        assert!(!Classification::HarnessError.is_confirmed());
    }

    #[test]
    fn test_classification_serialization_matches_display() {
        for c in Classification::ALL {
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c));
        }
    }
}
