//! Broadcasting module for real-time event streaming.
//!
//! Progress events let live consumers (status pages, desktop shells)
//! follow the analysis lifecycle without polling the database.

pub mod analysis_progress;

pub use analysis_progress::{AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressEvent};
