use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapitalStressError {
    /// Invalid or missing calibration input. Never retryable.
    #[error("Configuration error: {field} — {reason}")]
    Configuration { field: String, reason: String },

    /// An intermediate value violated an engine invariant.
    #[error("Computation error in quarter {quarter} ({segment}): {quantity} — {reason}")]
    Computation {
        quarter: u8,
        segment: String,
        quantity: String,
        reason: String,
    },
}

impl CapitalStressError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CapitalStressError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn computation(
        quarter: u8,
        segment: impl Into<String>,
        quantity: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CapitalStressError::Computation {
            quarter,
            segment: segment.into(),
            quantity: quantity.into(),
            reason: reason.into(),
        }
    }

    /// Attach the quarter and segment to a computation error raised by a
    /// context-free helper. Configuration errors pass through unchanged.
    pub fn located(self, at_quarter: u8, at_segment: &str) -> Self {
        match self {
            CapitalStressError::Computation {
                quantity, reason, ..
            } => CapitalStressError::Computation {
                quarter: at_quarter,
                segment: at_segment.to_string(),
                quantity,
                reason,
            },
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, CapitalStressError::Configuration { .. })
    }

    pub fn is_computation(&self) -> bool {
        matches!(self, CapitalStressError::Computation { .. })
    }
}
