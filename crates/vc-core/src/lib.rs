//! vc-core: shared types, IDs, errors, configuration, settings resolution
//! and the conversion job record.
//!
//! This crate is the foundational dependency for the other vc-* crates and
//! performs no I/O beyond reading a config file.

pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod settings;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::{Job, JobResult, JobState, LiveStats};
pub use settings::{EncodingPlan, FrameRate, PresetName, Resolution};
