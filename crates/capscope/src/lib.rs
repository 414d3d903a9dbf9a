pub mod broadcast;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod report;
pub mod scheduler;
pub mod service;

pub use broadcast::{AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressEvent};
pub use config::Settings;
pub use engine::{AnalysisEngine, ScriptEngine};
pub use error::{AnalysisError, CapscopeError, ConfigError, Result, SchedulerError};
pub use model::{AnalysisRecord, AnalysisStatus, FileType, RecordStatus, UploadedFile};
pub use report::AnalysisResult;
pub use scheduler::{AnalysisScheduler, QueueStatus, SchedulerHandle};
pub use service::AnalysisService;
