//! Repeat planning
//!
//! Works out how many whole copies of the source fit into the target and how
//! long the trailing partial segment must be.

use crate::error::RepeatError;

/// After at least one full repeat, a trailing segment this close to a full
/// repetition is promoted to one.
///
/// Avoids emitting a near-duplicate of the source (and absorbs float error
/// such as 0.3 / 0.1 = 2.9999...). Targets shorter than the source are never
/// rounded up.
pub const BOUNDARY_EPSILON_SECS: f64 = 0.5;

/// After at least one full repeat, partial segments shorter than this are
/// treated as float noise and dropped.
pub const MIN_PARTIAL_SECS: f64 = 0.001;

/// How a target duration is assembled from the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatPlan {
    /// Number of complete copies of the source
    pub full_repeats: u64,
    /// Length of the trailing segment taken from the start of the source
    pub partial_seconds: f64,
    /// `full_repeats * duration + partial_seconds`
    pub total_seconds: f64,
}

impl RepeatPlan {
    pub fn has_partial(&self) -> bool {
        self.partial_seconds > 0.0
    }

    /// Number of segments handed to the concatenator
    pub fn segment_count(&self) -> u64 {
        self.full_repeats + u64::from(self.has_partial())
    }
}

/// Plan the repetitions needed to reach `target_seconds`
pub fn plan(duration_seconds: f64, target_seconds: f64) -> Result<RepeatPlan, RepeatError> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(RepeatError::InvalidDuration(duration_seconds));
    }
    if !target_seconds.is_finite() || target_seconds <= 0.0 {
        return Err(RepeatError::InvalidTarget(target_seconds));
    }

    let mut full_repeats = (target_seconds / duration_seconds).floor() as u64;
    let mut partial_seconds = (target_seconds - full_repeats as f64 * duration_seconds).max(0.0);

    if full_repeats > 0 {
        if duration_seconds - partial_seconds < BOUNDARY_EPSILON_SECS {
            full_repeats += 1;
            partial_seconds = 0.0;
        } else if partial_seconds < MIN_PARTIAL_SECS {
            partial_seconds = 0.0;
        }
    }

    Ok(RepeatPlan {
        full_repeats,
        partial_seconds,
        total_seconds: full_repeats as f64 * duration_seconds + partial_seconds,
    })
}
