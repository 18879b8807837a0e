//! Deterministic visitor bucketing
//!
//! A visitor's variant is a pure function of `(visitor_id, test_id, split,
//! variants)`: the pair is hashed to a bucket in `[0, 100)` and the bucket is
//! looked up in the cumulative split. No state is kept, so the same visitor
//! lands in the same variant on every call and in every process, without a
//! database round trip.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::{BUCKET_COUNT, BUCKET_SCALE};
use crate::metrics::ASSIGNMENTS_TOTAL;
use crate::split::TrafficSplit;

/// One arm of an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_control: bool,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_control: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_control,
        }
    }

    pub fn control(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, true)
    }

    pub fn treatment(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, false)
    }
}

/// Result of bucketing one visitor; recomputed on demand, never stored here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAssignment {
    pub visitor_id: String,
    pub test_id: String,
    pub variant_id: String,
    /// Bucket value in `[0, 100)` the visitor hashed to
    pub bucket: f64,
    /// True when the split did not resolve and the fallback variant was used
    pub fallback: bool,
}

/// The variant used when the split cannot place a visitor
///
/// The marked control, or the first variant if none is marked.
pub fn fallback_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .find(|v| v.is_control)
        .or_else(|| variants.first())
}

/// Hash-based variant assignment
pub struct BucketAssigner;

impl BucketAssigner {
    /// Map `visitor_id:test_id` to a bucket value in `[0, 100)`
    ///
    /// The first 32 bits of the SHA-256 digest (the first eight hex
    /// characters) are reduced modulo 10 000, giving two-decimal granularity.
    pub fn bucket_value(visitor_id: &str, test_id: &str) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(visitor_id.as_bytes());
        hasher.update(b":");
        hasher.update(test_id.as_bytes());
        let digest = hasher.finalize();

        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (prefix % BUCKET_COUNT) as f64 / BUCKET_SCALE
    }

    /// Id of the split entry whose `[cum, cum + pct)` interval holds `bucket`
    pub fn resolve(bucket: f64, split: &TrafficSplit) -> Option<&str> {
        let mut cumulative = 0.0;
        for (id, pct) in split.iter() {
            if bucket >= cumulative && bucket < cumulative + pct {
                return Some(id);
            }
            cumulative += pct;
        }
        None
    }

    /// Pick the variant a visitor should see
    ///
    /// Returns `None` only when there are no variants or either id is empty.
    /// A split that leaves the bucket uncovered, or names an id missing from
    /// `variants`, falls back to the control variant.
    pub fn assign<'a>(
        visitor_id: &str,
        test_id: &str,
        split: &TrafficSplit,
        variants: &'a [Variant],
    ) -> Option<&'a Variant> {
        Self::assign_with_bucket(visitor_id, test_id, split, variants).map(|(variant, _, _)| variant)
    }

    /// Like [`BucketAssigner::assign`] but returns the full assignment record
    pub fn assignment(
        visitor_id: &str,
        test_id: &str,
        split: &TrafficSplit,
        variants: &[Variant],
    ) -> Option<BucketAssignment> {
        Self::assign_with_bucket(visitor_id, test_id, split, variants).map(
            |(variant, bucket, fallback)| BucketAssignment {
                visitor_id: visitor_id.to_string(),
                test_id: test_id.to_string(),
                variant_id: variant.id.clone(),
                bucket,
                fallback,
            },
        )
    }

    fn assign_with_bucket<'a>(
        visitor_id: &str,
        test_id: &str,
        split: &TrafficSplit,
        variants: &'a [Variant],
    ) -> Option<(&'a Variant, f64, bool)> {
        if variants.is_empty() || visitor_id.is_empty() || test_id.is_empty() {
            ASSIGNMENTS_TOTAL.with_label_values(&["unassigned"]).inc();
            return None;
        }

        let bucket = Self::bucket_value(visitor_id, test_id);
        let matched = Self::resolve(bucket, split)
            .and_then(|id| variants.iter().find(|v| v.id == id));

        match matched {
            Some(variant) => {
                ASSIGNMENTS_TOTAL.with_label_values(&["assigned"]).inc();
                Some((variant, bucket, false))
            }
            None => {
                let variant = fallback_variant(variants)?;
                debug!(
                    test_id,
                    bucket,
                    fallback = %variant.id,
                    "Split did not resolve a variant, using fallback"
                );
                ASSIGNMENTS_TOTAL.with_label_values(&["fallback"]).inc();
                Some((variant, bucket, true))
            }
        }
    }
}
