//! Analysis engine abstraction.
//!
//! The scheduler never talks to a subprocess directly: it goes through
//! the `AnalysisEngine` trait. `ScriptEngine` is the real implementation;
//! tests supply a deterministic fake.

pub mod fallback;
pub mod script;

use async_trait::async_trait;

use crate::error::AnalysisError;
use crate::model::{AnalysisConfig, UploadedFile};
use crate::report::AnalysisResult;

pub use script::ScriptEngine;

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Analyzes one uploaded file. Engine unavailability is not an error
    /// (implementations fall back to synthetic results); every `Err`
    /// marks that file's record as failed.
    async fn analyze(
        &self,
        file: &UploadedFile,
        config: &AnalysisConfig,
    ) -> Result<AnalysisResult, AnalysisError>;
}
