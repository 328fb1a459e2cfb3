use crate::handoff::{LatestFrame, LatestSlot};
use lookout_core::gallery::enrollment_embedding;
use lookout_core::{
    EmbeddingBackend, EnrollError, Embedding, Frame, FrameOutcome, FrameProcessor, FrameSource,
    Gallery, PipelineError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Tunables for the capture loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub match_threshold: f32,
    pub detection_scale: f32,
    pub frame_interval: Duration,
    /// Consecutive failed captures before the source counts as lost.
    pub max_missed_frames: u32,
}

/// Lifecycle of the capture loop, observable by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Running,
    Stopped,
    /// The video source failed; the loop has ended.
    Failed(String),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    EnrollmentEmbedding {
        image: Frame,
        reply: oneshot::Sender<Result<Embedding, EnrollError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    latest: watch::Receiver<LatestFrame>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// Validate an enrollment photo and compute its embedding on the engine
    /// thread, which owns the backend. Does not touch the gallery.
    pub async fn enrollment_embedding(&self, image: Frame) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::EnrollmentEmbedding {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Most recent processed frame, if any.
    pub fn latest(&self) -> LatestFrame {
        self.latest.borrow().clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Resolves once the loop has stopped or failed.
    pub async fn finished(&self) -> EngineStatus {
        let mut status = self.status.clone();
        let finished = match status.wait_for(|s| !matches!(s, EngineStatus::Running)).await {
            Ok(s) => s.clone(),
            Err(_) => EngineStatus::Stopped,
        };
        finished
    }
}

/// The running engine: a handle plus ownership of the worker thread.
///
/// Dropping it stops the loop and blocks until the source is released.
pub struct Engine {
    handle: EngineHandle,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<Result<(), PipelineError>>>,
}

impl Engine {
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for the worker to release the source.
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), PipelineError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let _ = self.shutdown.send(true);
        match thread.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::SourceUnavailable("engine thread panicked".into())),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::debug!(error = %e, "engine stopped on drop");
        }
    }
}

/// Spawn the capture loop on a dedicated OS thread.
///
/// The thread owns `source` and `backend`; both are dropped (and the
/// camera released) on every exit path.
pub fn spawn_engine<S, B>(
    source: S,
    backend: B,
    gallery: Arc<Gallery>,
    settings: EngineSettings,
) -> Result<Engine, EngineError>
where
    S: FrameSource + Send + 'static,
    B: EmbeddingBackend + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let (slot, latest) = LatestSlot::new();
    let (status_tx, status) = watch::channel(EngineStatus::Running);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let processor = FrameProcessor::new(backend, gallery)
        .threshold(settings.match_threshold)
        .detection_scale(settings.detection_scale)
        .max_missed_frames(settings.max_missed_frames);

    let thread = std::thread::Builder::new()
        .name("lookout-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let result = run_loop(source, processor, rx, slot, shutdown_rx, settings.frame_interval);
            let final_status = match &result {
                Ok(()) => EngineStatus::Stopped,
                Err(e) => EngineStatus::Failed(e.to_string()),
            };
            let _ = status_tx.send(final_status);
            tracing::info!("engine thread exiting");
            result
        })
        .map_err(EngineError::Spawn)?;

    Ok(Engine {
        handle: EngineHandle { tx, latest, status },
        shutdown,
        thread: Some(thread),
    })
}

fn run_loop<S, B>(
    mut source: S,
    mut processor: FrameProcessor<B>,
    mut requests: mpsc::Receiver<EngineRequest>,
    slot: LatestSlot,
    shutdown: watch::Receiver<bool>,
    frame_interval: Duration,
) -> Result<(), PipelineError>
where
    S: FrameSource,
    B: EmbeddingBackend,
{
    let mut handles_alive = true;
    loop {
        let stop_requested = *shutdown.borrow();
        if stop_requested || shutdown.has_changed().is_err() {
            tracing::info!("engine shutdown requested");
            return Ok(());
        }

        // Enrollment requests are served between frames.
        while handles_alive {
            match requests.try_recv() {
                Ok(EngineRequest::EnrollmentEmbedding { image, reply }) => {
                    let result = enrollment_embedding(&image, processor.backend_mut());
                    if let Err(e) = &result {
                        tracing::info!(error = %e, "enrollment image rejected");
                    }
                    let _ = reply.send(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => handles_alive = false,
            }
        }

        match processor.process(&mut source) {
            Ok(FrameOutcome::Processed(processed)) => {
                tracing::trace!(
                    seq = processed.frame.sequence,
                    faces = processed.detections.len(),
                    "frame processed"
                );
                slot.publish(processed);
            }
            Ok(FrameOutcome::NoFrame) => {}
            Err(e) => {
                tracing::error!(error = %e, "video source lost; stopping capture loop");
                return Err(e);
            }
        }

        if !frame_interval.is_zero() {
            std::thread::sleep(frame_interval);
        }
    }
}
