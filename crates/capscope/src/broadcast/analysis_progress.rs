//! Analysis progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of a file's analysis lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisPhase::Queued => write!(f, "Queued"),
            AnalysisPhase::Running => write!(f, "Running"),
            AnalysisPhase::Completed => write!(f, "Completed"),
            AnalysisPhase::Failed => write!(f, "Failed"),
            AnalysisPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Progress event for one file's analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisProgressEvent {
    /// File the analysis belongs to.
    pub file_id: String,
    /// Current analysis record, once one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    /// Current lifecycle phase.
    pub phase: AnalysisPhase,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Short error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisProgressEvent {
    /// Creates a new progress event.
    pub fn new(file_id: &str, phase: AnalysisPhase, message: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            analysis_id: None,
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Creates a running event tied to a record.
    pub fn running(file_id: &str, analysis_id: &str) -> Self {
        let mut event = Self::new(file_id, AnalysisPhase::Running, "Analysis started");
        event.analysis_id = Some(analysis_id.to_string());
        event
    }

    /// Creates a completion event.
    pub fn completed(file_id: &str, analysis_id: &str) -> Self {
        let mut event = Self::new(file_id, AnalysisPhase::Completed, "Analysis completed");
        event.analysis_id = Some(analysis_id.to_string());
        event
    }

    /// Creates a failure event.
    pub fn failed(file_id: &str, analysis_id: &str, error: &str) -> Self {
        let mut event = Self::new(file_id, AnalysisPhase::Failed, "Analysis failed");
        event.analysis_id = Some(analysis_id.to_string());
        event.error = Some(error.to_string());
        event
    }
}

/// Broadcasts analysis progress events for streaming.
#[derive(Clone)]
pub struct AnalysisProgressBroadcaster {
    sender: Arc<broadcast::Sender<AnalysisProgressEvent>>,
}

impl AnalysisProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: AnalysisProgressEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for AnalysisProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = AnalysisProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(AnalysisProgressEvent::new(
            "file-1",
            AnalysisPhase::Queued,
            "Analysis queued",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.file_id, "file-1");
        assert_eq!(received.phase, AnalysisPhase::Queued);
        assert!(received.analysis_id.is_none());
    }

    #[test]
    fn test_failure_event_carries_error() {
        let broadcaster = AnalysisProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(AnalysisProgressEvent::failed(
            "file-2",
            "record-9",
            "engine exited with code 2",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.phase, AnalysisPhase::Failed);
        assert_eq!(received.analysis_id.as_deref(), Some("record-9"));
        assert_eq!(
            received.error.as_deref(),
            Some("engine exited with code 2")
        );
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let broadcaster = AnalysisProgressBroadcaster::default();
        broadcaster.send(AnalysisProgressEvent::completed("file-3", "record-1"));
    }

    #[test]
    fn test_event_serialization() {
        let event = AnalysisProgressEvent::running("file-4", "record-2");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"fileId\":\"file-4\""));
        assert!(json.contains("\"analysisId\":\"record-2\""));
        assert!(json.contains("\"phase\":\"running\""));
        assert!(!json.contains("error"));
    }
}
