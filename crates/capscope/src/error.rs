use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapscopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse {name}='{value}': {source}")]
    ParseVar {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

/// Failures from a single analysis run. Each variant marks exactly one
/// file's record as failed; none of them stops the queue.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Analysis script not found: {path}")]
    ScriptMissing { path: PathBuf },

    #[error("Failed to start analysis engine: {source}")]
    ProcessSpawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to collect analysis engine output: {source}")]
    ProcessIo {
        #[source]
        source: std::io::Error,
    },

    #[error("Analysis engine timed out after {}ms", .timeout.as_millis())]
    ProcessTimeout { timeout: Duration },

    #[error("Analysis engine exited with code {code}: {stderr}")]
    Execution { code: i32, stderr: String },

    #[error("Failed to parse analysis engine output: {source}")]
    ResultParse {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize engine configuration: {0}")]
    ConfigSerialize(#[source] serde_json::Error),
}

impl AnalysisError {
    /// Stable identifier stored on failed analysis records.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::ScriptMissing { .. } => "script_missing",
            AnalysisError::ProcessSpawn { .. } => "process_spawn",
            AnalysisError::ProcessIo { .. } => "process_io",
            AnalysisError::ProcessTimeout { .. } => "process_timeout",
            AnalysisError::Execution { .. } => "execution_error",
            AnalysisError::ResultParse { .. } => "result_parse",
            AnalysisError::ConfigSerialize(_) => "config_serialize",
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("Analysis already queued or running for file {file_id}")]
    AlreadyInFlight { file_id: String },

    #[error("Analysis for file {file_id} is running and cannot be cancelled")]
    JobRunning { file_id: String },

    #[error("No queued analysis for file {file_id}")]
    NotQueued { file_id: String },

    #[error("Scheduler is shut down")]
    ChannelClosed,

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, CapscopeError>;
