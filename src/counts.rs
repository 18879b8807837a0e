//! Aggregated per-variant counts supplied by the analytics pipeline

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::frequentist::conversion_rate;

/// Point-in-time snapshot of one variant's traffic
///
/// Fields are public for callers whose pipeline already guarantees
/// `conversions <= impressions`; use [`VariantCount::new`] otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCount {
    pub conversions: u64,
    pub impressions: u64,
}

impl VariantCount {
    /// Checked constructor, `None` when conversions exceed impressions
    pub fn new(conversions: u64, impressions: u64) -> Option<Self> {
        (conversions <= impressions).then_some(Self {
            conversions,
            impressions,
        })
    }

    /// Impressions that did not convert
    pub fn failures(&self) -> u64 {
        self.impressions.saturating_sub(self.conversions)
    }

    pub fn conversion_rate(&self) -> f64 {
        conversion_rate(self.conversions, self.impressions)
    }

    /// Check the pipeline invariant, naming the variant on failure
    pub fn validate(&self, variant_id: &str) -> Result<()> {
        if self.conversions > self.impressions {
            return Err(EngineError::InvalidCounts {
                variant: variant_id.to_string(),
                conversions: self.conversions,
                impressions: self.impressions,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_constructor() {
        assert!(VariantCount::new(5, 100).is_some());
        assert!(VariantCount::new(0, 0).is_some());
        assert!(VariantCount::new(101, 100).is_none());

        let raw = VariantCount {
            conversions: 101,
            impressions: 100,
        };
        assert_eq!(raw.validate("v1").unwrap_err().code(), "INVALID_COUNTS");
        assert!(VariantCount::new(100, 100).unwrap().validate("v1").is_ok());
    }

    #[test]
    fn test_failures_and_rate() {
        let count = VariantCount::new(25, 100).unwrap();
        assert_eq!(count.failures(), 75);
        assert_eq!(count.conversion_rate(), 0.25);
        assert_eq!(VariantCount::default().conversion_rate(), 0.0);
    }

    #[test]
    fn test_validate_names_variant() {
        let bad = VariantCount {
            conversions: 12,
            impressions: 10,
        };
        let err = bad.validate("treatment").unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidCounts {
                variant: "treatment".to_string(),
                conversions: 12,
                impressions: 10,
            }
        );
    }
}
