//! Job lifecycle transitions.
//!
//! One analysis run moves a file through `pending → running →
//! {completed | failed}`. Every transition stamps the file and its
//! current analysis record in the same step, through the repositories,
//! before the scheduler clears the running-set entry.

use chrono::Utc;
use tracing::{info, warn};

use crate::broadcast::{AnalysisProgressBroadcaster, AnalysisProgressEvent};
use crate::db::{analysis_repo, file_repo, Database};
use crate::engine::AnalysisEngine;
use crate::error::{AnalysisError, SchedulerError};
use crate::model::{AnalysisConfig, AnalysisFailure, AnalysisRecord, AnalysisStatus, UploadedFile};
use crate::report::AnalysisResult;

/// Runs one admitted analysis job to completion.
///
/// Per-job engine failures are absorbed into the failed state; an `Err`
/// here means the job could not even be bookkept (file gone, storage
/// down) and is logged by the scheduler. Either way the queue proceeds.
pub(crate) async fn run_analysis(
    db: &Database,
    engine: &dyn AnalysisEngine,
    broadcaster: &AnalysisProgressBroadcaster,
    file_id: &str,
) -> Result<(), SchedulerError> {
    let Some(mut file) = file_repo::find_by_id(db, file_id)? else {
        // Deleted between enqueue and admission: the job is quietly
        // abandoned and the slot freed.
        warn!("file {} no longer exists, skipping analysis", file_id);
        return Ok(());
    };

    info!("starting analysis of {} ({})", file.original_name, file.id);
    let record = begin_run(db, &mut file)?;
    broadcaster.send(AnalysisProgressEvent::running(&file.id, &record.id));

    match engine.analyze(&file, &record.config).await {
        Ok(results) => complete_run(db, &mut file, &record, results, broadcaster)?,
        Err(err) => fail_run(db, &mut file, &record, &err, broadcaster)?,
    }

    Ok(())
}

/// Enters `running`: creates the analysis record and stamps the file.
fn begin_run(db: &Database, file: &mut UploadedFile) -> Result<AnalysisRecord, SchedulerError> {
    // Exactly one record is current per file; a leftover from a previous
    // run is replaced, never accumulated.
    if let Some(old_id) = file.analysis_id.take() {
        analysis_repo::delete(db, &old_id)?;
    }

    let record = AnalysisRecord::new(&file.id, AnalysisConfig::default());
    analysis_repo::insert(db, &record)?;

    file.analysis_status = AnalysisStatus::Running;
    file.analysis_id = Some(record.id.clone());
    file.last_error = None;
    file_repo::update(db, file)?;

    Ok(record)
}

/// Enters `completed`: stores results and merges the summary into the
/// file metadata.
fn complete_run(
    db: &Database,
    file: &mut UploadedFile,
    record: &AnalysisRecord,
    results: AnalysisResult,
    broadcaster: &AnalysisProgressBroadcaster,
) -> Result<(), SchedulerError> {
    analysis_repo::complete(db, &record.id, &results, Utc::now())?;

    file.merge_metadata(results.summary_map());
    file.analysis_status = AnalysisStatus::Completed;
    file_repo::update(db, file)?;

    broadcaster.send(AnalysisProgressEvent::completed(&file.id, &record.id));
    info!("analysis completed for {}", file.id);
    Ok(())
}

/// Enters `failed`: stores the structured failure on the record and the
/// short message on the file.
fn fail_run(
    db: &Database,
    file: &mut UploadedFile,
    record: &AnalysisRecord,
    err: &AnalysisError,
    broadcaster: &AnalysisProgressBroadcaster,
) -> Result<(), SchedulerError> {
    let failure = AnalysisFailure::from(err);
    analysis_repo::fail(db, &record.id, &failure, Utc::now())?;

    file.analysis_status = AnalysisStatus::Failed;
    file.last_error = Some(err.to_string());
    file_repo::update(db, file)?;

    broadcaster.send(AnalysisProgressEvent::failed(
        &file.id,
        &record.id,
        &failure.message,
    ));
    warn!("analysis failed for {}: {}", file.id, failure.message);
    Ok(())
}
