//! Traffic splits and their validation
//!
//! A split maps variant ids to percentages. Iteration order is the order the
//! variants were inserted in, because bucket boundaries are laid out in that
//! order: reordering a split moves visitors between variants.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{SPLIT_SUM_TOLERANCE, SPLIT_TOTAL};
use crate::errors::{EngineError, Result};
use crate::numeric::round_to;

/// Insertion-ordered mapping of variant id to traffic percentage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficSplit {
    entries: Vec<(String, f64)>,
}

impl TrafficSplit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(id, percentage)` pairs, keeping their order
    ///
    /// A repeated id overwrites the earlier percentage in place.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut split = Self::new();
        for (id, percentage) in entries {
            split.insert(id, percentage);
        }
        split
    }

    /// Set a variant's share, appending it if unseen
    pub fn insert(&mut self, variant_id: impl Into<String>, percentage: f64) {
        let variant_id = variant_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == variant_id) {
            Some(entry) => entry.1 = percentage,
            None => self.entries.push((variant_id, percentage)),
        }
    }

    pub fn get(&self, variant_id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(id, _)| id == variant_id)
            .map(|(_, pct)| *pct)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(id, pct)| (id.as_str(), *pct))
    }

    pub fn variant_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all percentages
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, pct)| pct).sum()
    }

    /// Validate, turning failures into [`EngineError::InvalidSplit`]
    pub fn validated(self) -> Result<Self> {
        let validation = validate_split(&self);
        if validation.valid {
            Ok(self)
        } else {
            Err(EngineError::InvalidSplit(validation.errors))
        }
    }
}

impl Serialize for TrafficSplit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, pct) in &self.entries {
            map.serialize_entry(id, pct)?;
        }
        map.end()
    }
}

struct TrafficSplitVisitor;

impl<'de> Visitor<'de> for TrafficSplitVisitor {
    type Value = TrafficSplit;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of variant id to percentage")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut split = TrafficSplit::new();
        while let Some((id, pct)) = access.next_entry::<String, f64>()? {
            split.insert(id, pct);
        }
        Ok(split)
    }
}

impl<'de> Deserialize<'de> for TrafficSplit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(TrafficSplitVisitor)
    }
}

/// Outcome of [`validate_split`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check a split before it is saved on a test
///
/// Every violation is reported, except an empty split which short-circuits.
pub fn validate_split(split: &TrafficSplit) -> SplitValidation {
    if split.is_empty() {
        return SplitValidation {
            valid: false,
            errors: vec!["Traffic split is empty".to_string()],
        };
    }

    let mut errors = Vec::new();

    for (id, pct) in split.iter() {
        if pct < 0.0 {
            errors.push(format!("Variant '{id}' has negative percentage: {pct}"));
        }
    }

    for (id, pct) in split.iter() {
        if pct > SPLIT_TOTAL {
            errors.push(format!("Variant '{id}' exceeds 100%: {pct}"));
        }
    }

    for (id, pct) in split.iter() {
        if !pct.is_finite() {
            errors.push(format!("Variant '{id}' has non-finite percentage: {pct}"));
        }
    }

    // NaN sums fail this comparison too
    let total = split.total();
    if !((total - SPLIT_TOTAL).abs() <= SPLIT_SUM_TOLERANCE) {
        errors.push(format!("Percentages must sum to 100 (got {total:.2})"));
    }

    SplitValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Divide traffic evenly, rounded to two decimals
///
/// The last variant absorbs the rounding residual so the shares add up to
/// exactly 100.00: three variants get 33.33 / 33.33 / 33.34. Repeated ids
/// collapse into one entry at their first position.
pub fn create_even_split<S: AsRef<str>>(variant_ids: &[S]) -> TrafficSplit {
    let mut split = TrafficSplit::new();
    for id in variant_ids {
        split.insert(id.as_ref(), 0.0);
    }
    if split.is_empty() {
        return split;
    }

    let n = split.len() as f64;
    let share = round_to(SPLIT_TOTAL / n, 2);
    for entry in split.entries.iter_mut() {
        entry.1 = share;
    }

    let residual = SPLIT_TOTAL - share * n;
    if let Some(last) = split.entries.last_mut() {
        last.1 = round_to(last.1 + residual, 2);
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let split = TrafficSplit::from_entries([("zeta", 20.0), ("alpha", 30.0), ("mid", 50.0)]);
        let ids: Vec<&str> = split.variant_ids().collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut split = TrafficSplit::from_entries([("a", 50.0), ("b", 50.0)]);
        split.insert("a", 40.0);
        split.insert("c", 10.0);
        assert_eq!(split.get("a"), Some(40.0));
        let ids: Vec<&str> = split.variant_ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_valid_split() {
        let split = TrafficSplit::from_entries([("a", 30.0), ("b", 70.0)]);
        let result = validate_split(&split);
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_within_tolerance() {
        let split = TrafficSplit::from_entries([("a", 33.33), ("b", 33.33), ("c", 33.335)]);
        assert!(validate_split(&split).valid);
    }

    #[test]
    fn test_empty_split_short_circuits() {
        let result = validate_split(&TrafficSplit::new());
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Traffic split is empty".to_string()]);
    }

    #[test]
    fn test_reports_all_violations() {
        let split = TrafficSplit::from_entries([("a", -10.0), ("b", 150.0)]);
        let result = validate_split(&split);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors[0].contains("negative"));
        assert!(result.errors[1].contains("exceeds 100%"));
        assert!(result.errors[2].contains("got 140.00"));
    }

    #[test]
    fn test_nan_is_reported() {
        let split = TrafficSplit::from_entries([("a", f64::NAN), ("b", 100.0)]);
        let result = validate_split(&split);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("non-finite")));
        assert!(result.errors.iter().any(|e| e.contains("sum to 100")));
    }

    #[test]
    fn test_validated_error() {
        let split = TrafficSplit::from_entries([("a", 40.0), ("b", 40.0)]);
        match split.validated() {
            Err(EngineError::InvalidSplit(errors)) => {
                assert_eq!(errors, vec!["Percentages must sum to 100 (got 80.00)".to_string()]);
            }
            other => panic!("expected InvalidSplit, got {other:?}"),
        }
    }

    #[test]
    fn test_even_split_three_ways() {
        let split = create_even_split(&["a", "b", "c"]);
        assert_eq!(split.get("a"), Some(33.33));
        assert_eq!(split.get("b"), Some(33.33));
        assert_eq!(split.get("c"), Some(33.34));
        assert!((split.total() - 100.0).abs() < 1e-9);
        assert!(validate_split(&split).valid);
    }

    #[test]
    fn test_even_split_six_ways() {
        let split = create_even_split(&["a", "b", "c", "d", "e", "f"]);
        // 16.67 * 6 = 100.02, last variant gives back the excess
        assert_eq!(split.get("a"), Some(16.67));
        assert_eq!(split.get("f"), Some(16.65));
        assert!((split.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_even_split_dedupes_ids() {
        let split = create_even_split(&["a", "a", "b"]);
        let shares: Vec<(&str, f64)> = split.iter().collect();
        assert_eq!(shares, vec![("a", 50.0), ("b", 50.0)]);
        assert!(validate_split(&split).valid);
    }

    #[test]
    fn test_even_split_empty_and_single() {
        assert!(create_even_split::<&str>(&[]).is_empty());
        let single = create_even_split(&["only"]);
        assert_eq!(single.get("only"), Some(100.0));
    }

    #[test]
    fn test_serde_keeps_order() {
        let json = r#"{"treatment":70.0,"control":30.0}"#;
        let split: TrafficSplit = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = split.variant_ids().collect();
        assert_eq!(ids, vec!["treatment", "control"]);
        assert_eq!(serde_json::to_string(&split).unwrap(), json);
    }
}
