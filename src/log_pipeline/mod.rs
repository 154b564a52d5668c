//! Asynchronous, best-effort observability pipeline.
//!
//! Ingress is a bounded channel of capacity 1,000; ten workers drain a
//! single shared receiver into a mutex-protected batch that flushes at 100
//! entries or on a 5-second tick. `try_send` backpressure drops and warns
//! on a full channel rather than blocking submitters.

pub mod error;
pub mod sink;

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub use error::LogPipelineError;
pub use sink::{SearchSink, Stats};

use crate::models::LogEntry;

const CHANNEL_CAPACITY: usize = 1_000;
const WORKER_COUNT: usize = 10;
const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct LogPipeline {
    sender: mpsc::Sender<LogEntry>,
    dropped: Arc<AtomicU64>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl LogPipeline {
    /// Spawns the worker pool and ticker, and bootstraps the index mapping.
    pub async fn start(sink: Arc<SearchSink>) -> Self {
        if let Err(err) = sink.bootstrap_index().await {
            tracing::warn!(error = %err, "index bootstrap failed (treated as best-effort)");
        }

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let batch = Arc::new(Mutex::new(Vec::with_capacity(BATCH_SIZE)));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dropped = Arc::new(AtomicU64::new(0));

        for worker_id in 0..WORKER_COUNT {
            let receiver = receiver.clone();
            let batch = batch.clone();
            let sink = sink.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                worker_loop(worker_id, receiver, batch, sink, shutdown).await;
            });
        }

        {
            let batch = batch.clone();
            let sink = sink.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                ticker_loop(batch, sink, shutdown).await;
            });
        }

        tracker.close();

        Self { sender, dropped, shutdown, tracker }
    }

    /// Non-blocking ingress. Drops and warns on a full channel —
    /// every 100th drop, to avoid flooding logs under sustained overload.
    pub fn submit(&self, entry: LogEntry) {
        if let Err(err) = self.sender.try_send(entry) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    crate::metrics::record_log_entry_dropped();
                    let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % 100 == 0 {
                        tracing::warn!(dropped_total = n, "log pipeline channel full, dropping entries");
                    }
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("log pipeline channel closed, entry dropped");
                }
            }
        }
    }

    /// Closes ingress, lets workers drain, and performs a final flush.
    pub async fn shutdown(self) {
        drop(self.sender);
        self.shutdown.cancel();
        self.tracker.wait().await;
    }
}

async fn worker_loop(
    _worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<LogEntry>>>,
    batch: Arc<Mutex<Vec<LogEntry>>>,
    sink: Arc<SearchSink>,
    shutdown: CancellationToken,
) {
    loop {
        let entry = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(entry) = entry else {
            break;
        };

        let full_batch = {
            let mut batch = batch.lock().await;
            batch.push(entry);
            if batch.len() >= BATCH_SIZE {
                Some(std::mem::replace(&mut *batch, Vec::with_capacity(BATCH_SIZE)))
            } else {
                None
            }
        };

        if let Some(entries) = full_batch {
            flush(&sink, entries).await;
        }
    }

    // Channel closed: final drain and flush.
    let remaining = {
        let mut batch = batch.lock().await;
        std::mem::take(&mut *batch)
    };
    flush(&sink, remaining).await;
    let _ = shutdown.is_cancelled();
}

async fn ticker_loop(batch: Arc<Mutex<Vec<LogEntry>>>, sink: Arc<SearchSink>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let entries = {
                    let mut batch = batch.lock().await;
                    std::mem::take(&mut *batch)
                };
                flush(&sink, entries).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn flush(sink: &SearchSink, entries: Vec<LogEntry>) {
    if entries.is_empty() {
        return;
    }
    let count = entries.len();
    let started = std::time::Instant::now();
    let result = sink.bulk_index(&entries).await;
    crate::metrics::record_bulk_flush_duration(started.elapsed());
    if let Err(err) = result {
        tracing::warn!(error = %err, batch_size = count, "bulk flush failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_entry() -> LogEntry {
        use crate::models::{LogMetrics, LogRequest, LogResponse};
        LogEntry {
            trace_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            virtual_key_id: Uuid::new_v4(),
            virtual_key_name: "k".into(),
            user_id: Uuid::new_v4(),
            request: LogRequest {
                model: "gpt-4o".into(),
                provider: "openai".into(),
                messages: "[]".into(),
                temperature: None,
                max_tokens: None,
            },
            response: LogResponse {
                content: "hi".into(),
                status_code: 200,
                error: None,
                prompt_tokens: 1,
                completion_tokens: 1,
            },
            metrics: LogMetrics { latency_ms: 10, cost_usd: 0.0001 },
        }
    }

    #[tokio::test]
    async fn submit_never_blocks_even_when_backend_is_unreachable() {
        let sink = Arc::new(SearchSink::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1".to_string(),
        ));
        let pipeline = LogPipeline::start(sink).await;
        for _ in 0..2_000 {
            pipeline.submit(sample_entry());
        }
        pipeline.shutdown().await;
    }
}
