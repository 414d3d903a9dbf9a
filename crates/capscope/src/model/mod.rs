//! Domain types: uploaded files, analysis records, and their lifecycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::report::AnalysisResult;

/// Declared category of an uploaded capture, derived from its extension.
/// Selects both the engine variant and the result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pcap,
    Cap,
    Pcapng,
    Har,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pcap" => Some(FileType::Pcap),
            "cap" => Some(FileType::Cap),
            "pcapng" => Some(FileType::Pcapng),
            "har" => Some(FileType::Har),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Pcap => "pcap",
            FileType::Cap => "cap",
            FileType::Pcapng => "pcapng",
            FileType::Har => "har",
        }
    }

    /// Packet-oriented captures share one engine variant and result schema;
    /// request archives (HAR) use the other.
    pub fn is_packet_capture(self) -> bool {
        !matches!(self, FileType::Har)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis lifecycle of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "running" => Some(AnalysisStatus::Running),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }

    /// Legal lifecycle edges. The only back-edges are restarts of settled
    /// files; a running analysis can never be reset underneath its job.
    pub fn can_transition(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
                | (Pending, Pending)
        )
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single analysis record. Records are created already running,
/// so there is no pending state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Running,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Running => "running",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RecordStatus::Running),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded capture file as seen by the scheduler. Created by the upload
/// flow; only the analysis lifecycle fields are mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub original_name: String,
    pub file_type: FileType,
    pub file_path: String,
    pub size: u64,
    pub analysis_status: AnalysisStatus,
    /// Back-reference to the current analysis record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    /// Short human-readable error from the last failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Result summaries merged in on completion.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn new(
        original_name: &str,
        file_type: FileType,
        file_path: impl Into<String>,
        size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_name: original_name.to_string(),
            file_type,
            file_path: file_path.into(),
            size,
            analysis_status: AnalysisStatus::Pending,
            analysis_id: None,
            last_error: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges result summary entries into the file metadata, overwriting
    /// existing keys.
    pub fn merge_metadata(&mut self, entries: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in entries {
            self.metadata.insert(key, value);
        }
    }
}

/// Snapshot of the engine configuration a record was created with.
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub analysis_type: String,
    pub options: AnalysisOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_type: "basic".to_string(),
            options: AnalysisOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub include_payload: bool,
    pub detect_anomalies: bool,
    pub performance_analysis: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_payload: false,
            detect_anomalies: true,
            performance_analysis: true,
        }
    }
}

/// Structured failure detail persisted on a failed record. The short
/// message also lands on the file; the raw detail stays here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFailure {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&AnalysisError> for AnalysisFailure {
    fn from(err: &AnalysisError) -> Self {
        let detail = match err {
            AnalysisError::Execution { stderr, .. } => Some(stderr.clone()),
            AnalysisError::ResultParse { excerpt, .. } => Some(excerpt.clone()),
            _ => None,
        };
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            detail,
        }
    }
}

/// One analysis run of one file. Exactly one record is current per file;
/// restarting replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub file_id: String,
    pub status: RecordStatus,
    pub config: AnalysisConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AnalysisFailure>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    pub fn new(file_id: &str, config: AnalysisConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            status: RecordStatus::Running,
            config,
            results: None,
            failure: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
