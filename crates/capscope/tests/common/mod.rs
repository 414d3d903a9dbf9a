//! Test harness for scheduler and service integration tests.
//!
//! Provides a fully wired in-memory environment (database, scheduler,
//! service, broadcaster) around a deterministic `FakeEngine`, so no test
//! ever launches a real subprocess.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use capscope::broadcast::AnalysisProgressBroadcaster;
use capscope::db::{file_repo, Database};
use capscope::engine::AnalysisEngine;
use capscope::error::AnalysisError;
use capscope::model::{AnalysisConfig, AnalysisStatus, FileType, UploadedFile};
use capscope::report::{AnalysisResult, PacketCaptureReport, PacketSummary};
use capscope::scheduler::{AnalysisScheduler, QueueStatus};
use capscope::{AnalysisService, Settings};

/// How long polling helpers wait before declaring a test hung.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Deterministic engine stand-in.
///
/// In gated mode each analysis blocks until its file id is released,
/// which makes concurrency assertions exact instead of timing-based.
pub struct FakeEngine {
    gated: bool,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failing: Mutex<HashSet<String>>,
    timing_out: Mutex<HashSet<String>>,
}

impl FakeEngine {
    /// Engine that completes every analysis immediately.
    pub fn new() -> Self {
        Self {
            gated: false,
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            timing_out: Mutex::new(HashSet::new()),
        }
    }

    /// Engine whose analyses block until released per file id.
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    fn gate(&self, file_id: &str) -> Arc<Notify> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(gates.entry(file_id.to_string()).or_default())
    }

    /// Unblocks the analysis of one file. Safe to call before the job
    /// reaches the gate (the permit is stored).
    pub fn release(&self, file_id: &str) {
        self.gate(file_id).notify_one();
    }

    /// Makes the analysis of this file fail with an execution error.
    pub fn fail(&self, file_id: &str) {
        self.failing.lock().unwrap().insert(file_id.to_string());
    }

    /// Makes the analysis of this file fail with a timeout.
    pub fn time_out(&self, file_id: &str) {
        self.timing_out.lock().unwrap().insert(file_id.to_string());
    }

    /// Lets a previously failing file succeed again.
    pub fn clear_failure(&self, file_id: &str) {
        self.failing.lock().unwrap().remove(file_id);
        self.timing_out.lock().unwrap().remove(file_id);
    }

    /// File ids the engine was invoked for, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisEngine for FakeEngine {
    async fn analyze(
        &self,
        file: &UploadedFile,
        _config: &AnalysisConfig,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.calls.lock().unwrap().push(file.id.clone());

        if self.gated {
            let gate = self.gate(&file.id);
            gate.notified().await;
        }

        if self.timing_out.lock().unwrap().contains(&file.id) {
            return Err(AnalysisError::ProcessTimeout {
                timeout: Duration::from_millis(100),
            });
        }
        if self.failing.lock().unwrap().contains(&file.id) {
            return Err(AnalysisError::Execution {
                code: 2,
                stderr: "synthetic engine failure".to_string(),
            });
        }

        Ok(sample_result(file.size))
    }
}

/// A minimal non-fallback packet report, as the real engine would emit.
pub fn sample_result(total_bytes: u64) -> AnalysisResult {
    AnalysisResult::PacketCapture(PacketCaptureReport {
        summary: PacketSummary {
            total_packets: 42,
            total_bytes,
            duration: 3.5,
            avg_packet_size: total_bytes / 42,
            packets_per_second: 12.0,
        },
        ..PacketCaptureReport::default()
    })
}

/// Fully wired test environment.
pub struct TestContext {
    pub db: Database,
    pub engine: Arc<FakeEngine>,
    pub broadcaster: AnalysisProgressBroadcaster,
    pub scheduler: AnalysisScheduler,
    pub service: AnalysisService,
    pub dir: TempDir,
}

impl TestContext {
    pub fn new(max_concurrent: usize, gated: bool) -> Self {
        let engine = Arc::new(if gated {
            FakeEngine::gated()
        } else {
            FakeEngine::new()
        });
        Self::with_fake_engine(max_concurrent, engine)
    }

    pub fn with_fake_engine(max_concurrent: usize, engine: Arc<FakeEngine>) -> Self {
        let (db, broadcaster, scheduler, service, dir) =
            wire(max_concurrent, Arc::clone(&engine) as Arc<dyn AnalysisEngine>);
        Self {
            db,
            engine,
            broadcaster,
            scheduler,
            service,
            dir,
        }
    }

    /// Creates a real file on disk and registers it as uploaded.
    pub fn seed_file(&self, name: &str, file_type: FileType, bytes: &[u8]) -> UploadedFile {
        seed_file(&self.db, &self.dir, name, file_type, bytes)
    }

    /// Polls until the file reaches the given status.
    pub async fn wait_for_status(&self, file_id: &str, status: AnalysisStatus) {
        wait_for_status(&self.db, file_id, status).await;
    }

    /// Polls the scheduler until the queue snapshot satisfies the
    /// predicate.
    pub async fn wait_for_queue<F>(&self, predicate: F) -> QueueStatus
    where
        F: Fn(&QueueStatus) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let status = self.scheduler.status().await.expect("scheduler alive");
            if predicate(&status) {
                return status;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("queue never reached expected state: {:?}", status);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Wires the full stack around any engine implementation.
pub fn wire(
    max_concurrent: usize,
    engine: Arc<dyn AnalysisEngine>,
) -> (
    Database,
    AnalysisProgressBroadcaster,
    AnalysisScheduler,
    AnalysisService,
    TempDir,
) {
    let settings = Settings {
        max_concurrent,
        ..Settings::default()
    };
    let db = Database::open_in_memory().expect("in-memory database");
    let broadcaster = AnalysisProgressBroadcaster::default();
    let scheduler =
        AnalysisScheduler::spawn(db.clone(), engine, broadcaster.clone(), &settings);
    let service = AnalysisService::new(db.clone(), scheduler.handle(), broadcaster.clone());
    let dir = tempfile::tempdir().expect("temp dir");
    (db, broadcaster, scheduler, service, dir)
}

pub fn seed_file(
    db: &Database,
    dir: &TempDir,
    name: &str,
    file_type: FileType,
    bytes: &[u8],
) -> UploadedFile {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("write capture file");
    let file = UploadedFile::new(
        name,
        file_type,
        path.to_string_lossy().to_string(),
        bytes.len() as u64,
    );
    file_repo::insert(db, &file).expect("insert file");
    file
}

pub async fn wait_for_status(db: &Database, file_id: &str, status: AnalysisStatus) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let file = file_repo::find_by_id(db, file_id)
            .expect("load file")
            .expect("file exists");
        if file.analysis_status == status {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "file {} stuck in {:?}, expected {:?}",
                file_id, file.analysis_status, status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
