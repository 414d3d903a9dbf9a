//! Service facade for the upload and presentation collaborators.
//!
//! Upload calls `start_analysis` after storing a file; the presentation
//! layer reads queue status and records, and triggers restart/cancel.
//! Everything here is a thin composition of the repositories and the
//! scheduler handle.

use tokio::sync::broadcast;

use crate::broadcast::{AnalysisProgressBroadcaster, AnalysisProgressEvent};
use crate::db::{analysis_repo, file_repo, Database};
use crate::error::SchedulerError;
use crate::model::{AnalysisRecord, AnalysisStatus, UploadedFile};
use crate::scheduler::{QueueStatus, SchedulerHandle};

#[derive(Clone)]
pub struct AnalysisService {
    db: Database,
    scheduler: SchedulerHandle,
    broadcaster: AnalysisProgressBroadcaster,
}

impl AnalysisService {
    pub fn new(
        db: Database,
        scheduler: SchedulerHandle,
        broadcaster: AnalysisProgressBroadcaster,
    ) -> Self {
        Self {
            db,
            scheduler,
            broadcaster,
        }
    }

    /// Queues an analysis for an uploaded file.
    pub async fn start_analysis(&self, file_id: &str) -> crate::Result<()> {
        let file = self.require_file(file_id)?;
        log::info!("queueing analysis for {} ({})", file.original_name, file.id);
        self.scheduler.enqueue(&file.id).await?;
        Ok(())
    }

    /// Restarts analysis of a settled file: the previous record is
    /// deleted and a fresh one will be created on admission. Rejected
    /// while the file is queued or running.
    pub async fn re_analyze(&self, file_id: &str) -> crate::Result<()> {
        if self.scheduler.is_in_flight(file_id).await? {
            return Err(SchedulerError::AlreadyInFlight {
                file_id: file_id.to_string(),
            }
            .into());
        }

        let mut file = self.require_file(file_id)?;
        if !file.analysis_status.can_transition(AnalysisStatus::Pending) {
            return Err(SchedulerError::JobRunning {
                file_id: file_id.to_string(),
            }
            .into());
        }

        if let Some(record_id) = file.analysis_id.take() {
            analysis_repo::delete(&self.db, &record_id)?;
        }
        file.analysis_status = AnalysisStatus::Pending;
        file.last_error = None;
        file_repo::update(&self.db, &file)?;

        log::info!("re-queueing analysis for {}", file.id);
        self.scheduler.enqueue(&file.id).await?;
        Ok(())
    }

    /// Cancels a still-queued analysis; running jobs are not cancellable.
    pub async fn cancel_analysis(&self, file_id: &str) -> crate::Result<()> {
        self.scheduler.cancel(file_id).await?;
        Ok(())
    }

    /// Live queue snapshot.
    pub async fn queue_status(&self) -> crate::Result<QueueStatus> {
        Ok(self.scheduler.status().await?)
    }

    /// The current analysis record for a file, if any.
    pub fn analysis_for_file(&self, file_id: &str) -> crate::Result<Option<AnalysisRecord>> {
        Ok(analysis_repo::find_by_file(&self.db, file_id)?)
    }

    /// Looks up an uploaded file.
    pub fn file(&self, file_id: &str) -> crate::Result<Option<UploadedFile>> {
        Ok(file_repo::find_by_id(&self.db, file_id)?)
    }

    /// Subscribes to live progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisProgressEvent> {
        self.broadcaster.subscribe()
    }

    fn require_file(&self, file_id: &str) -> crate::Result<UploadedFile> {
        file_repo::find_by_id(&self.db, file_id)?.ok_or_else(|| {
            SchedulerError::FileNotFound {
                file_id: file_id.to_string(),
            }
            .into()
        })
    }
}
