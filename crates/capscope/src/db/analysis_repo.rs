//! Analysis repository — persistence for analysis records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::model::{AnalysisConfig, AnalysisFailure, AnalysisRecord, RecordStatus};
use crate::report::AnalysisResult;

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn from_row(row: &Row<'_>) -> Result<AnalysisRecord, rusqlite::Error> {
    let id: String = row.get("id")?;

    let status_raw: String = row.get("status")?;
    let status = RecordStatus::parse(&status_raw).unwrap_or_else(|| {
        log::warn!(
            "Unknown record status '{}' for analysis {}, defaulting to running",
            status_raw,
            id
        );
        RecordStatus::Running
    });

    let config = row
        .get::<_, String>("config")
        .ok()
        .and_then(|s| serde_json::from_str::<AnalysisConfig>(&s).ok())
        .unwrap_or_else(|| {
            log::warn!("Unreadable config for analysis {}, using defaults", id);
            AnalysisConfig::default()
        });

    let results = row
        .get::<_, Option<String>>("results")?
        .and_then(|s| serde_json::from_str::<AnalysisResult>(&s).ok());

    let failure = match row.get::<_, Option<String>>("error_kind")? {
        Some(kind) => Some(AnalysisFailure {
            kind,
            message: row
                .get::<_, Option<String>>("error_message")?
                .unwrap_or_default(),
            detail: row.get("error_detail")?,
        }),
        None => None,
    };

    let created_at: String = row.get("created_at")?;
    let completed_at = row
        .get::<_, Option<String>>("completed_at")?
        .map(|s| parse_timestamp(&s));

    Ok(AnalysisRecord {
        id,
        file_id: row.get("file_id")?,
        status,
        config,
        results,
        failure,
        created_at: parse_timestamp(&created_at),
        completed_at,
    })
}

/// Inserts a new analysis record.
pub fn insert(db: &Database, record: &AnalysisRecord) -> Result<(), DatabaseError> {
    let config = serde_json::to_string(&record.config).map_err(|source| {
        DatabaseError::Encode {
            column: "config",
            source,
        }
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO analyses (id, file_id, status, config, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.file_id,
                record.status.as_str(),
                config,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds an analysis record by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<AnalysisRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM analyses WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the current (latest) analysis record for a file.
pub fn find_by_file(db: &Database, file_id: &str) -> Result<Option<AnalysisRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM analyses WHERE file_id = ?1 ORDER BY created_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![file_id], from_row)?;
        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Marks a record completed and stores its results.
pub fn complete(
    db: &Database,
    id: &str,
    results: &AnalysisResult,
    completed_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let results = serde_json::to_string(results).map_err(|source| DatabaseError::Encode {
        column: "results",
        source,
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analyses SET status = ?2, results = ?3, completed_at = ?4 WHERE id = ?1",
            params![
                id,
                RecordStatus::Completed.as_str(),
                results,
                completed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Marks a record failed and stores the structured failure detail.
pub fn fail(
    db: &Database,
    id: &str,
    failure: &AnalysisFailure,
    completed_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analyses SET status = ?2, error_kind = ?3, error_message = ?4,
             error_detail = ?5, completed_at = ?6 WHERE id = ?1",
            params![
                id,
                RecordStatus::Failed.as_str(),
                failure.kind,
                failure.message,
                failure.detail,
                completed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Deletes an analysis record (restart or external file deletion).
pub fn delete(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM analyses WHERE id = ?1", params![id])?;
        Ok(())
    })
}
