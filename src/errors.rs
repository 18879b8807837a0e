//! Structured error types for the decision engine
//!
//! The core operations (assignment, rates, z-tests, sampling) never fail;
//! errors only surface from checked constructors, configuration loading and
//! the report builder.

use serde::{Deserialize, Serialize};

/// Errors raised by checked entry points
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid traffic split: {}", .0.join("; "))]
    InvalidSplit(Vec<String>),

    #[error("Invalid counts for '{variant}': {conversions} conversions > {impressions} impressions")]
    InvalidCounts {
        variant: String,
        conversions: u64,
        impressions: u64,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Experiment has no variants")]
    NoVariants,
}

impl EngineError {
    /// Create a configuration error
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSplit(_) => "INVALID_SPLIT",
            Self::InvalidCounts { .. } => "INVALID_COUNTS",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::UnknownVariant(_) => "UNKNOWN_VARIANT",
            Self::NoVariants => "NO_VARIANTS",
        }
    }

    /// Convert to a serializable response body
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            details: match self {
                Self::InvalidSplit(errors) => Some(errors.clone()),
                _ => None,
            },
        }
    }
}

/// Error body for callers that forward engine errors to API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Individual validation failures, when there are several
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::NoVariants.code(), "NO_VARIANTS");
        assert_eq!(
            EngineError::UnknownVariant("v9".to_string()).code(),
            "UNKNOWN_VARIANT"
        );
        assert_eq!(
            EngineError::config("simulations", "must be > 0").code(),
            "INVALID_CONFIG"
        );
    }

    #[test]
    fn test_split_error_lists_every_failure() {
        let err = EngineError::InvalidSplit(vec![
            "Variant 'a' has negative percentage: -5".to_string(),
            "Percentages must sum to 100 (got 95.00)".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.contains("negative"));
        assert!(message.contains("95.00"));

        let response = err.to_response();
        assert_eq!(response.code, "INVALID_SPLIT");
        assert_eq!(response.details.map(|d| d.len()), Some(2));
    }

    #[test]
    fn test_counts_error_message() {
        let err = EngineError::InvalidCounts {
            variant: "treatment".to_string(),
            conversions: 12,
            impressions: 10,
        };
        assert!(err.to_string().contains("12 conversions > 10 impressions"));

        let json = serde_json::to_string(&err.to_response()).unwrap();
        assert!(!json.contains("details"));
    }
}
