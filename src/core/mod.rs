//! Core repeat logic and state
//!
//! This module contains:
//! - Repeat planning (full copies plus a trailing partial segment)
//! - Source and output descriptions shared by every stage
//! - Application settings
//! - Human-readable formatting helpers

mod format;
mod plan;
mod settings;
mod track;

pub use format::{format_duration, format_size};
pub use plan::{plan, RepeatPlan};
pub use settings::AppSettings;
pub use track::{OutputSpec, SourceTrack};
