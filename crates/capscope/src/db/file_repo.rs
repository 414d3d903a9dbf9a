//! File repository — persistence for uploaded capture files.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::model::{AnalysisStatus, FileType, UploadedFile};

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn from_row(row: &Row<'_>) -> Result<UploadedFile, rusqlite::Error> {
    let id: String = row.get("id")?;

    let file_type_raw: String = row.get("file_type")?;
    let file_type = FileType::from_extension(&file_type_raw).unwrap_or_else(|| {
        log::warn!(
            "Unknown file type '{}' for file {}, defaulting to pcap",
            file_type_raw,
            id
        );
        FileType::Pcap
    });

    let status_raw: String = row.get("analysis_status")?;
    let analysis_status = AnalysisStatus::parse(&status_raw).unwrap_or_else(|| {
        log::warn!(
            "Unknown analysis status '{}' for file {}, defaulting to pending",
            status_raw,
            id
        );
        AnalysisStatus::Pending
    });

    let metadata = row
        .get::<_, Option<String>>("metadata")?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(UploadedFile {
        id,
        original_name: row.get("original_name")?,
        file_type,
        file_path: row.get("file_path")?,
        size: row.get("size")?,
        analysis_status,
        analysis_id: row.get("analysis_id")?,
        last_error: row.get("last_error")?,
        metadata,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

/// Inserts a new file row.
pub fn insert(db: &Database, file: &UploadedFile) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&file.metadata).map_err(|source| {
        DatabaseError::Encode {
            column: "metadata",
            source,
        }
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO files (id, original_name, file_type, file_path, size,
             analysis_status, analysis_id, last_error, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                file.id,
                file.original_name,
                file.file_type.as_str(),
                file.file_path,
                file.size,
                file.analysis_status.as_str(),
                file.analysis_id,
                file.last_error,
                metadata,
                file.created_at.to_rfc3339(),
                file.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Updates an existing file row. The `updated_at` stamp is refreshed here
/// so callers never have to remember it.
pub fn update(db: &Database, file: &UploadedFile) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&file.metadata).map_err(|source| {
        DatabaseError::Encode {
            column: "metadata",
            source,
        }
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "UPDATE files SET original_name=?2, file_type=?3, file_path=?4, size=?5,
             analysis_status=?6, analysis_id=?7, last_error=?8, metadata=?9, updated_at=?10
             WHERE id=?1",
            params![
                file.id,
                file.original_name,
                file.file_type.as_str(),
                file.file_path,
                file.size,
                file.analysis_status.as_str(),
                file.analysis_id,
                file.last_error,
                metadata,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds a file by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UploadedFile>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM files WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(file)) => Ok(Some(file)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a file row. Analysis records cascade.
pub fn delete(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_file() -> UploadedFile {
        UploadedFile::new("trace.pcap", FileType::Pcap, "/tmp/trace.pcap", 2048)
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let file = sample_file();
        insert(&db, &file).unwrap();

        let found = find_by_id(&db, &file.id).unwrap();
        assert!(found.is_some());
        let found = found.unwrap();
        assert_eq!(found.original_name, "trace.pcap");
        assert_eq!(found.file_type, FileType::Pcap);
        assert_eq!(found.size, 2048);
        assert_eq!(found.analysis_status, AnalysisStatus::Pending);
        assert!(found.analysis_id.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        let found = find_by_id(&db, "nonexistent").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_update_lifecycle_fields() {
        let db = test_db();
        let mut file = sample_file();
        insert(&db, &file).unwrap();

        file.analysis_status = AnalysisStatus::Failed;
        file.analysis_id = Some("record-1".to_string());
        file.last_error = Some("engine exited with code 2".to_string());
        update(&db, &file).unwrap();

        let found = find_by_id(&db, &file.id).unwrap().unwrap();
        assert_eq!(found.analysis_status, AnalysisStatus::Failed);
        assert_eq!(found.analysis_id.as_deref(), Some("record-1"));
        assert_eq!(
            found.last_error.as_deref(),
            Some("engine exited with code 2")
        );
    }

    #[test]
    fn test_metadata_round_trip() {
        let db = test_db();
        let mut file = sample_file();
        let mut entries = serde_json::Map::new();
        entries.insert("totalPackets".to_string(), serde_json::json!(1547));
        entries.insert("duration".to_string(), serde_json::json!(120.5));
        file.merge_metadata(entries);
        insert(&db, &file).unwrap();

        let found = find_by_id(&db, &file.id).unwrap().unwrap();
        assert_eq!(found.metadata["totalPackets"], serde_json::json!(1547));
        assert_eq!(found.metadata["duration"], serde_json::json!(120.5));
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        let file = sample_file();
        insert(&db, &file).unwrap();

        delete(&db, &file.id).unwrap();
        assert!(find_by_id(&db, &file.id).unwrap().is_none());
    }

    #[test]
    fn test_har_file_type_round_trip() {
        let db = test_db();
        let file = UploadedFile::new("session.har", FileType::Har, "/tmp/session.har", 512);
        insert(&db, &file).unwrap();

        let found = find_by_id(&db, &file.id).unwrap().unwrap();
        assert_eq!(found.file_type, FileType::Har);
    }
}
