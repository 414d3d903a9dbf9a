//! Concurrency-bounded, self-draining analysis scheduler.
//!
//! One dispatch task owns the waiting list and running set outright and
//! serves callers over a command channel, so no mutation ever races:
//! enqueue, cancel, and status requests are answered by the same loop
//! that admits jobs. Job execution itself runs in spawned tasks off the
//! loop; each settled job reports back over a completion channel, which
//! re-triggers admission without any polling.

pub mod lifecycle;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::broadcast::{AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressEvent};
use crate::config::Settings;
use crate::db::Database;
use crate::engine::AnalysisEngine;
use crate::error::SchedulerError;

const COMMAND_BUFFER: usize = 64;

/// Snapshot of the queue, safe to take while jobs are in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub waiting: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub running_tasks: Vec<RunningTaskInfo>,
}

/// One in-flight analysis as reported by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningTaskInfo {
    pub file_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

enum Command {
    Enqueue {
        file_id: String,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Cancel {
        file_id: String,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Status {
        reply: oneshot::Sender<QueueStatus>,
    },
    InFlight {
        file_id: String,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Cheap clonable handle for submitting scheduler requests.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Appends the file to the waiting list and admits jobs up to the
    /// concurrency ceiling. A file already queued or running is rejected
    /// with `AlreadyInFlight`.
    pub async fn enqueue(&self, file_id: &str) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Enqueue {
                file_id: file_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        rx.await.map_err(|_| SchedulerError::ChannelClosed)?
    }

    /// Removes a still-waiting file from the queue. A running job cannot
    /// be cancelled (`JobRunning`); in-flight cancellation of the
    /// external process is deliberately unsupported.
    pub async fn cancel(&self, file_id: &str) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Cancel {
                file_id: file_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        rx.await.map_err(|_| SchedulerError::ChannelClosed)?
    }

    /// Pure read of the current queue state.
    pub async fn status(&self) -> Result<QueueStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Status { reply })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }

    /// True when the file is currently queued or running.
    pub async fn is_in_flight(&self, file_id: &str) -> Result<bool, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::InFlight {
                file_id: file_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }
}

/// The scheduler instance. Owns the dispatch task; constructed once at
/// startup and shared through [`SchedulerHandle`]s.
pub struct AnalysisScheduler {
    handle: SchedulerHandle,
    join: JoinHandle<()>,
}

impl AnalysisScheduler {
    /// Spawns the dispatch loop.
    pub fn spawn(
        db: Database,
        engine: Arc<dyn AnalysisEngine>,
        broadcaster: AnalysisProgressBroadcaster,
        settings: &Settings,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let dispatch = Dispatch {
            db,
            engine,
            broadcaster,
            max_concurrent: settings.max_concurrent,
            waiting: VecDeque::new(),
            running: HashMap::new(),
            done_tx,
        };

        info!(
            "analysis scheduler started (max {} concurrent)",
            settings.max_concurrent
        );

        let join = tokio::spawn(dispatch.run(commands_rx, done_rx));

        Self {
            handle: SchedulerHandle {
                commands: commands_tx,
            },
            join,
        }
    }

    /// Returns a clonable handle for callers.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub async fn enqueue(&self, file_id: &str) -> Result<(), SchedulerError> {
        self.handle.enqueue(file_id).await
    }

    pub async fn cancel(&self, file_id: &str) -> Result<(), SchedulerError> {
        self.handle.cancel(file_id).await
    }

    pub async fn status(&self) -> Result<QueueStatus, SchedulerError> {
        self.handle.status().await
    }

    pub async fn is_in_flight(&self, file_id: &str) -> Result<bool, SchedulerError> {
        self.handle.is_in_flight(file_id).await
    }

    /// Stops accepting requests, abandons still-waiting jobs, lets
    /// in-flight jobs finish, then returns.
    pub async fn shutdown(self) {
        if self.handle.commands.send(Command::Shutdown).await.is_err() {
            debug!("scheduler already stopped");
        }
        if let Err(e) = self.join.await {
            error!("scheduler dispatch task panicked: {}", e);
        }
    }
}

struct RunningEntry {
    started_at: DateTime<Utc>,
    started: Instant,
}

/// State owned exclusively by the dispatch task.
struct Dispatch {
    db: Database,
    engine: Arc<dyn AnalysisEngine>,
    broadcaster: AnalysisProgressBroadcaster,
    max_concurrent: usize,
    waiting: VecDeque<String>,
    running: HashMap<String, RunningEntry>,
    done_tx: mpsc::UnboundedSender<String>,
}

impl Dispatch {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<String>,
    ) {
        let mut draining = false;

        loop {
            if draining {
                if self.running.is_empty() {
                    break;
                }
                match done.recv().await {
                    Some(file_id) => self.settle(&file_id),
                    None => break,
                }
                continue;
            }

            tokio::select! {
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Enqueue { file_id, reply }) => {
                            let _ = reply.send(self.enqueue(file_id));
                        }
                        Some(Command::Cancel { file_id, reply }) => {
                            let _ = reply.send(self.cancel(&file_id));
                        }
                        Some(Command::Status { reply }) => {
                            let _ = reply.send(self.status());
                        }
                        Some(Command::InFlight { file_id, reply }) => {
                            let in_flight = self.running.contains_key(&file_id)
                                || self.waiting.contains(&file_id);
                            let _ = reply.send(in_flight);
                        }
                        Some(Command::Shutdown) | None => {
                            if !self.waiting.is_empty() {
                                warn!(
                                    "scheduler shutting down, abandoning {} queued jobs",
                                    self.waiting.len()
                                );
                                self.waiting.clear();
                            }
                            draining = true;
                        }
                    }
                }
                Some(file_id) = done.recv() => {
                    self.settle(&file_id);
                }
            }
        }

        info!("analysis scheduler stopped");
    }

    /// A job settled (success or failure): the running entry is removed
    /// unconditionally and the freed slot is refilled in the same step.
    fn settle(&mut self, file_id: &str) {
        if self.running.remove(file_id).is_none() {
            warn!("settled job {} was not in the running set", file_id);
        }
        self.admit();
    }

    fn enqueue(&mut self, file_id: String) -> Result<(), SchedulerError> {
        if self.running.contains_key(&file_id) || self.waiting.contains(&file_id) {
            return Err(SchedulerError::AlreadyInFlight { file_id });
        }

        debug!("queued analysis for {}", file_id);
        self.broadcaster.send(AnalysisProgressEvent::new(
            &file_id,
            AnalysisPhase::Queued,
            "Analysis queued",
        ));
        self.waiting.push_back(file_id);
        self.admit();
        Ok(())
    }

    fn cancel(&mut self, file_id: &str) -> Result<(), SchedulerError> {
        if let Some(pos) = self.waiting.iter().position(|id| id == file_id) {
            self.waiting.remove(pos);
            info!("cancelled queued analysis for {}", file_id);
            self.broadcaster.send(AnalysisProgressEvent::new(
                file_id,
                AnalysisPhase::Cancelled,
                "Analysis cancelled before it started",
            ));
            return Ok(());
        }

        if self.running.contains_key(file_id) {
            warn!("analysis for {} is already running, cannot cancel", file_id);
            return Err(SchedulerError::JobRunning {
                file_id: file_id.to_string(),
            });
        }

        Err(SchedulerError::NotQueued {
            file_id: file_id.to_string(),
        })
    }

    fn status(&self) -> QueueStatus {
        let mut running_tasks: Vec<RunningTaskInfo> = self
            .running
            .iter()
            .map(|(file_id, entry)| RunningTaskInfo {
                file_id: file_id.clone(),
                started_at: entry.started_at,
                elapsed_ms: entry.started.elapsed().as_millis() as u64,
            })
            .collect();
        running_tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        QueueStatus {
            waiting: self.waiting.len(),
            running: self.running.len(),
            max_concurrent: self.max_concurrent,
            running_tasks,
        }
    }

    /// Admits waiting jobs until the ceiling is reached, FIFO.
    fn admit(&mut self) {
        while self.running.len() < self.max_concurrent {
            let Some(file_id) = self.waiting.pop_front() else {
                break;
            };
            self.running.insert(
                file_id.clone(),
                RunningEntry {
                    started_at: Utc::now(),
                    started: Instant::now(),
                },
            );
            self.spawn_job(file_id);
        }
    }

    fn spawn_job(&self, file_id: String) {
        let db = self.db.clone();
        let engine = Arc::clone(&self.engine);
        let broadcaster = self.broadcaster.clone();
        let done = self.done_tx.clone();

        let span = tracing::info_span!("analysis_job", file_id = %file_id);
        tokio::spawn(
            async move {
                if let Err(e) =
                    lifecycle::run_analysis(&db, engine.as_ref(), &broadcaster, &file_id).await
                {
                    error!("analysis job for {} aborted: {}", file_id, e);
                }
                // Unconditional: the slot is freed even when bookkeeping
                // failed above.
                let _ = done.send(file_id);
            }
            .instrument(span),
        );
    }
}
