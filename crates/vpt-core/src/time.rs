// crates/vpt-core/src/time.rs
// ============================================================================
// Module: Engine Time Model
// Description: Canonical timestamp representation for action/step/zap records.
// Purpose: Keep step recording deterministic and replayable.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The engine always stamps records with Unix milliseconds supplied by the
//! caller's clock; this module only defines the wire shape and helpers for
//! working with it, it does not read the wall clock itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch millisecond timestamp used throughout step and zap records.
///
/// # Invariants
/// - Always non-negative for records produced after the epoch; negative
///   values are accepted but callers should treat them as invalid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Wraps a raw unix-millisecond value.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as unix seconds, truncating toward zero.
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0 / 1000
    }

    /// Returns the absolute difference, in seconds, between two timestamps.
    #[must_use]
    pub fn abs_diff_seconds(self, other: Self) -> i64 {
        (self.as_unix_seconds() - other.as_unix_seconds()).abs()
    }

    /// Returns the duration between `self` and an earlier timestamp, in milliseconds.
    ///
    /// Saturates at zero if `self` precedes `earlier`.
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn unix_seconds_truncates() {
        let ts = Timestamp::from_millis(1_700_000_500);
        assert_eq!(ts.as_unix_seconds(), 1_700_000);
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = Timestamp::from_millis(10_000);
        let b = Timestamp::from_millis(4_000);
        assert_eq!(a.abs_diff_seconds(b), b.abs_diff_seconds(a));
    }

    #[test]
    fn millis_since_saturates_at_zero() {
        let earlier = Timestamp::from_millis(5_000);
        let later = Timestamp::from_millis(1_000);
        assert_eq!(later.millis_since(earlier), 0);
    }
}
