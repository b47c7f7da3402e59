//! Batched upload of job results.
//!
//! Console lines, timeline updates, and file uploads are queued locally and
//! shipped to the server on background loops. This is best-effort
//! telemetry: a failed incremental flush is logged and retried on the next
//! cycle, never surfaced to the job itself. Only the final drain on
//! shutdown aggregates unrecoverable errors and raises them once.

use async_trait::async_trait;
use gantry_core::error::{Error, Result};
use gantry_core::ids::{JobId, TimelineId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

const CONSOLE_LINE_FLUSH_THRESHOLD: usize = 100;
const TIMELINE_UPDATE_FLUSH_THRESHOLD: usize = 25;
const FILE_UPLOAD_FLUSH_THRESHOLD: usize = 5;

const CONSOLE_LINE_DELAY: Duration = Duration::from_millis(200);
const TIMELINE_UPDATE_DELAY: Duration = Duration::from_millis(500);
const FILE_UPLOAD_DELAY: Duration = Duration::from_millis(1000);

/// One line of console output attributed to a timeline record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLine {
    pub record_id: Uuid,
    pub line: String,
}

/// State of a timeline record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimelineRecordState {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A progress record for a job, phase, or step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRecord {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: TimelineRecordState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub attempt: u32,
}

/// A log or attachment upload associated with a timeline record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub record_id: Uuid,
    pub name: String,
    pub content: Vec<u8>,
}

/// Server surface the queue uploads to.
#[async_trait]
pub trait JobServer: Send + Sync {
    async fn append_console_lines(&self, job_id: JobId, lines: Vec<ConsoleLine>) -> Result<()>;

    async fn update_timeline_records(
        &self,
        timeline_id: TimelineId,
        records: Vec<TimelineRecord>,
    ) -> Result<()>;

    async fn upload_file(&self, job_id: JobId, upload: FileUpload) -> Result<()>;
}

/// Queues job results and ships them on background loops.
pub struct JobServerQueue {
    line_tx: mpsc::UnboundedSender<ConsoleLine>,
    timeline_tx: mpsc::UnboundedSender<TimelineRecord>,
    file_tx: mpsc::UnboundedSender<FileUpload>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<Vec<String>>>,
}

impl JobServerQueue {
    /// Starts the upload loops for one job.
    pub fn start(server: Arc<dyn JobServer>, job_id: JobId, timeline_id: TimelineId) -> Self {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (timeline_tx, timeline_rx) = mpsc::unbounded_channel();
        let (file_tx, file_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let line_server = Arc::clone(&server);
        let line_worker = tokio::spawn(batch_loop(
            line_rx,
            shutdown_rx.clone(),
            CONSOLE_LINE_FLUSH_THRESHOLD,
            CONSOLE_LINE_DELAY,
            move |lines| {
                let server = Arc::clone(&line_server);
                async move { server.append_console_lines(job_id, lines).await }
            },
        ));

        let timeline_server = Arc::clone(&server);
        let timeline_worker = tokio::spawn(batch_loop(
            timeline_rx,
            shutdown_rx.clone(),
            TIMELINE_UPDATE_FLUSH_THRESHOLD,
            TIMELINE_UPDATE_DELAY,
            move |records| {
                let server = Arc::clone(&timeline_server);
                async move {
                    server
                        .update_timeline_records(timeline_id, merge_timeline_records(records))
                        .await
                }
            },
        ));

        let file_server = Arc::clone(&server);
        let file_worker = tokio::spawn(batch_loop(
            file_rx,
            shutdown_rx,
            FILE_UPLOAD_FLUSH_THRESHOLD,
            FILE_UPLOAD_DELAY,
            move |uploads| {
                let server = Arc::clone(&file_server);
                async move {
                    for upload in uploads {
                        server.upload_file(job_id, upload).await?;
                    }
                    Ok(())
                }
            },
        ));

        Self {
            line_tx,
            timeline_tx,
            file_tx,
            shutdown_tx,
            workers: vec![line_worker, timeline_worker, file_worker],
        }
    }

    pub fn queue_console_line(&self, record_id: Uuid, line: impl Into<String>) {
        let _ = self.line_tx.send(ConsoleLine {
            record_id,
            line: line.into(),
        });
    }

    pub fn queue_timeline_update(&self, record: TimelineRecord) {
        let _ = self.timeline_tx.send(record);
    }

    pub fn queue_file_upload(&self, upload: FileUpload) {
        let _ = self.file_tx.send(upload);
    }

    /// Flushes everything still queued and stops the loops. Errors from the
    /// final flush are aggregated and raised once.
    pub async fn drain(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        let mut errors = Vec::new();
        for worker in self.workers {
            match worker.await {
                Ok(worker_errors) => errors.extend(worker_errors),
                Err(join_error) => errors.push(join_error.to_string()),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::QueueDrainFailed(errors))
        }
    }
}

/// Generic upload loop: batches whatever is queued, flushing at least every
/// `delay` and immediately once `threshold` items are waiting. Failed
/// batches are kept and retried on the next cycle; during shutdown the
/// failure is recorded instead and the loop exits once the queue is empty.
async fn batch_loop<T, F, Fut>(
    mut rx: mpsc::UnboundedReceiver<T>,
    mut shutdown: watch::Receiver<bool>,
    threshold: usize,
    delay: Duration,
    mut flush: F,
) -> Vec<String>
where
    T: Clone + Send + 'static,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut pending: Vec<T> = Vec::new();
    let mut drain_errors = Vec::new();

    loop {
        let shutting_down = *shutdown.borrow();

        while let Ok(item) = rx.try_recv() {
            pending.push(item);
        }

        if !pending.is_empty() {
            let batch = std::mem::take(&mut pending);
            if let Err(error) = flush(batch.clone()).await {
                if shutting_down {
                    drain_errors.push(error.to_string());
                } else {
                    warn!(%error, "Upload batch failed; will retry on next flush");
                    pending = batch;
                }
            }
        }

        if shutting_down && pending.is_empty() && rx.is_empty() {
            break;
        }

        // Force an immediate flush once the incoming backlog crosses the
        // threshold. A failed batch waits for the delay instead, so retries
        // stay paced.
        if rx.len() >= threshold && pending.is_empty() {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    drain_errors
}

/// Collapses a batch so the latest update per record wins, preserving the
/// order records first appeared in.
fn merge_timeline_records(records: Vec<TimelineRecord>) -> Vec<TimelineRecord> {
    let mut merged: IndexMap<Uuid, TimelineRecord> = IndexMap::new();
    for record in records {
        merged.insert(record.id, record);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingServer {
        fail_first: AtomicUsize,
        lines: Mutex<Vec<ConsoleLine>>,
        line_calls: AtomicUsize,
        records: Mutex<Vec<TimelineRecord>>,
        uploads: Mutex<Vec<FileUpload>>,
    }

    #[async_trait]
    impl JobServer for RecordingServer {
        async fn append_console_lines(
            &self,
            _job_id: JobId,
            lines: Vec<ConsoleLine>,
        ) -> Result<()> {
            self.line_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    remaining.checked_sub(1)
                })
                .is_ok()
            {
                return Err(Error::Internal("simulated outage".to_string()));
            }
            self.lines.lock().unwrap().extend(lines);
            Ok(())
        }

        async fn update_timeline_records(
            &self,
            _timeline_id: TimelineId,
            records: Vec<TimelineRecord>,
        ) -> Result<()> {
            self.records.lock().unwrap().extend(records);
            Ok(())
        }

        async fn upload_file(&self, _job_id: JobId, upload: FileUpload) -> Result<()> {
            self.uploads.lock().unwrap().push(upload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn lines_are_flushed_and_drained() {
        let server = Arc::new(RecordingServer::default());
        let queue = JobServerQueue::start(
            Arc::clone(&server) as Arc<dyn JobServer>,
            JobId::new(),
            TimelineId::new(),
        );

        let record_id = Uuid::new_v4();
        for i in 0..10 {
            queue.queue_console_line(record_id, format!("line {i}"));
        }

        queue.drain().await.unwrap();

        let lines = server.lines.lock().unwrap();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0].line, "line 0");
        assert_eq!(lines[9].line, "line 9");
    }

    #[tokio::test]
    async fn failed_flush_is_retried_with_nothing_lost() {
        let server = Arc::new(RecordingServer {
            fail_first: AtomicUsize::new(1),
            ..RecordingServer::default()
        });
        let queue = JobServerQueue::start(
            Arc::clone(&server) as Arc<dyn JobServer>,
            JobId::new(),
            TimelineId::new(),
        );

        let record_id = Uuid::new_v4();
        queue.queue_console_line(record_id, "only line");

        // Give the loop time to fail once and retry.
        tokio::time::sleep(Duration::from_millis(600)).await;
        queue.drain().await.unwrap();

        assert!(server.line_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(server.lines.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drain_aggregates_terminal_errors() {
        let server = Arc::new(RecordingServer {
            fail_first: AtomicUsize::new(usize::MAX),
            ..RecordingServer::default()
        });
        let queue = JobServerQueue::start(
            Arc::clone(&server) as Arc<dyn JobServer>,
            JobId::new(),
            TimelineId::new(),
        );

        queue.queue_console_line(Uuid::new_v4(), "doomed");

        let error = queue.drain().await.unwrap_err();
        assert!(matches!(error, Error::QueueDrainFailed(errors) if !errors.is_empty()));
    }

    #[tokio::test]
    async fn timeline_batches_keep_latest_update_per_record() {
        let server = Arc::new(RecordingServer::default());
        let queue = JobServerQueue::start(
            Arc::clone(&server) as Arc<dyn JobServer>,
            JobId::new(),
            TimelineId::new(),
        );

        let record_id = Uuid::new_v4();
        queue.queue_timeline_update(TimelineRecord {
            id: record_id,
            state: TimelineRecordState::InProgress,
            ..TimelineRecord::default()
        });
        queue.queue_timeline_update(TimelineRecord {
            id: record_id,
            state: TimelineRecordState::Completed,
            ..TimelineRecord::default()
        });

        queue.drain().await.unwrap();

        let records = server.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, TimelineRecordState::Completed);
    }
}
