use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, warn};

use super::{PartialTranscript, SessionEvent};
use crate::error::PipelineError;
use crate::pipeline::{ChunkAccumulator, SegmentInput, recognize_chunk, run_segment};
use crate::provider::ProviderManager;

/// Counter of spawned tasks that teardown can wait on.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a decrement in between is not missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// State shared between a session and the tasks it spawns.
pub(crate) struct SessionShared {
    pub(crate) manager: Arc<ProviderManager>,
    pub(crate) client_id: String,
    pub(crate) buffer: Mutex<ChunkAccumulator>,
    pub(crate) events: mpsc::Sender<SessionEvent>,
    pub(crate) in_flight: InFlight,
}

/// Decrements the in-flight count when the task ends, however it ends.
pub(crate) struct TaskGuard {
    shared: Arc<SessionShared>,
}

impl TaskGuard {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        shared.in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.shared.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.in_flight.idle.notify_waiters();
        }
    }
}

/// Resolves once the session is cancelled or its handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stopped| *stopped).await;
}

/// Sends an event unless the session has been cancelled.
async fn emit(shared: &SessionShared, cancel: &mut watch::Receiver<bool>, event: SessionEvent) {
    if *cancel.borrow() {
        return;
    }
    tokio::select! {
        biased;
        _ = cancelled(cancel) => {}
        result = shared.events.send(event) => {
            if result.is_err() {
                debug!(client_id = %shared.client_id, "Event receiver dropped");
            }
        }
    }
}

pub(crate) struct ChunkJob {
    pub(crate) chunk: Vec<u8>,
    pub(crate) format: String,
    pub(crate) sample_rate: u32,
    pub(crate) source_lang: Option<String>,
}

/// Recognizes a single chunk and emits a partial transcript.
pub(crate) fn spawn_partial(shared: &Arc<SessionShared>, mut cancel: watch::Receiver<bool>, job: ChunkJob) {
    let guard = TaskGuard::new(Arc::clone(shared));
    let shared = Arc::clone(shared);

    tokio::spawn(async move {
        let _guard = guard;
        let started = Instant::now();
        let recognized = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return,
            result = recognize_chunk(
                &shared.manager,
                &shared.client_id,
                job.chunk,
                &job.format,
                job.sample_rate,
                job.source_lang.as_deref(),
            ) => result,
        };

        match recognized {
            Ok(response) if response.transcript.is_empty() => {}
            Ok(response) => {
                let partial = PartialTranscript {
                    transcript: response.transcript,
                    confidence: response.confidence,
                    backend: response.meta.backend,
                    latency_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                };
                emit(&shared, &mut cancel, SessionEvent::Partial(partial)).await;
            }
            Err(err) => {
                debug!(client_id = %shared.client_id, error = %err.detail(), "Partial recognition failed");
                let message = format!("partial {err}");
                emit(&shared, &mut cancel, SessionEvent::Error { message }).await;
            }
        }
    });
}

pub(crate) struct SegmentJob {
    pub(crate) audio: Vec<u8>,
    pub(crate) format: String,
    pub(crate) sample_rate: u32,
    pub(crate) source_lang: Option<String>,
    pub(crate) target_lang: Option<String>,
}

/// Runs the full pipeline on a drained utterance and emits the final result.
pub(crate) fn spawn_final(shared: &Arc<SessionShared>, mut cancel: watch::Receiver<bool>, job: SegmentJob) {
    if job.audio.is_empty() {
        return;
    }
    let guard = TaskGuard::new(Arc::clone(shared));
    let shared = Arc::clone(shared);

    tokio::spawn(async move {
        let _guard = guard;
        let input = SegmentInput {
            client_id: shared.client_id.clone(),
            audio: job.audio,
            format: job.format,
            sample_rate: job.sample_rate,
            source_lang: job.source_lang,
            target_lang: job.target_lang,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return,
            result = run_segment(&shared.manager, input) => result,
        };

        match outcome {
            Ok(result) => emit(&shared, &mut cancel, SessionEvent::Final(Box::new(result))).await,
            Err(PipelineError::EmptyTranscript) => {
                debug!(client_id = %shared.client_id, "Segment had no speech, dropping");
            }
            Err(err) => {
                warn!(client_id = %shared.client_id, error = %err.detail(), "Segment pipeline failed");
                emit(&shared, &mut cancel, SessionEvent::Error { message: err.to_string() }).await;
            }
        }
    });
}
