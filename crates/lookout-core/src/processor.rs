//! Per-frame pipeline: acquire, detect, embed, match, rescale.

use crate::backend::EmbeddingBackend;
use crate::gallery::Gallery;
use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::types::{Detection, Frame};
use std::sync::Arc;
use thiserror::Error;

/// Default downsample factor applied before detection.
pub const DEFAULT_DETECTION_SCALE: f32 = 0.5;

/// Consecutive `NoFrame` captures after which the source counts as gone.
pub const DEFAULT_MAX_MISSED_FRAMES: u32 = 50;

/// Why a source produced no frame.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Nothing to read right now; the next attempt may succeed.
    #[error("no frame available: {0}")]
    NoFrame(String),
    /// The source is gone or was never opened.
    #[error("video source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Something that yields native-resolution frames.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

/// The result of one processing step.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The source had no frame. Distinct from a frame with zero faces.
    NoFrame,
    Processed(ProcessedFrame),
}

/// A frame and the detections found in it, in detector order.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

/// Runs detection and identity resolution for one frame at a time.
pub struct FrameProcessor<B: EmbeddingBackend, M: Matcher = EuclideanMatcher> {
    backend: B,
    matcher: M,
    gallery: Arc<Gallery>,
    threshold: f32,
    detection_scale: f32,
    max_missed_frames: u32,
    missed_frames: u32,
}

impl<B: EmbeddingBackend> FrameProcessor<B> {
    pub fn new(backend: B, gallery: Arc<Gallery>) -> Self {
        Self::with_matcher(backend, EuclideanMatcher, gallery)
    }
}

impl<B: EmbeddingBackend, M: Matcher> FrameProcessor<B, M> {
    pub fn with_matcher(backend: B, matcher: M, gallery: Arc<Gallery>) -> Self {
        Self {
            backend,
            matcher,
            gallery,
            threshold: DEFAULT_MATCH_THRESHOLD,
            detection_scale: DEFAULT_DETECTION_SCALE,
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
            missed_frames: 0,
        }
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Downsample factor for detection, clamped into (0, 1].
    pub fn detection_scale(mut self, scale: f32) -> Self {
        self.detection_scale = clamp_scale(scale);
        self
    }

    /// Escalate to `SourceUnavailable` after this many `NoFrame`s in a row.
    /// At least one miss is always tolerated.
    pub fn max_missed_frames(mut self, limit: u32) -> Self {
        self.max_missed_frames = limit.max(1);
        self
    }

    pub fn gallery(&self) -> &Arc<Gallery> {
        &self.gallery
    }

    /// Mutable access to the backend, for enrollment between frames.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Acquire one frame from `source` and process it.
    pub fn process<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<FrameOutcome, PipelineError> {
        let frame = match source.capture() {
            Ok(frame) => {
                self.missed_frames = 0;
                frame
            }
            Err(CaptureError::NoFrame(reason)) => {
                self.missed_frames += 1;
                if self.missed_frames >= self.max_missed_frames {
                    tracing::warn!(missed = self.missed_frames, reason, "source keeps failing; giving up");
                    return Err(PipelineError::SourceUnavailable(format!(
                        "{} consecutive captures failed, last: {reason}",
                        self.missed_frames
                    )));
                }
                tracing::debug!(missed = self.missed_frames, reason, "no frame available");
                return Ok(FrameOutcome::NoFrame);
            }
            Err(CaptureError::Unavailable(reason)) => {
                return Err(PipelineError::SourceUnavailable(reason));
            }
        };

        let detections = self.process_frame(&frame);
        Ok(FrameOutcome::Processed(ProcessedFrame { frame, detections }))
    }

    /// Detect and identify every face in a native-resolution frame.
    ///
    /// Backend failures are logged: a detector failure yields no detections,
    /// an embedding failure drops only that face.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<Detection> {
        let scale = self.detection_scale;
        let small;
        let detect_on = if scale < 1.0 {
            small = frame.downsample(scale);
            &small
        } else {
            frame
        };

        let faces = match self.backend.detect_faces(detect_on) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(seq = frame.sequence, error = %e, "face detection failed");
                return Vec::new();
            }
        };

        // One snapshot per frame: every face is matched against the same gallery.
        let gallery = self.gallery.snapshot();
        let mut detections = Vec::with_capacity(faces.len());

        for face in &faces {
            let native = face.unscale(scale);
            let embedding = match self.backend.embed(frame, &native) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!(seq = frame.sequence, error = %e, "skipping face: embedding failed");
                    continue;
                }
            };
            let result = self.matcher.compare(&embedding, &gallery, self.threshold);
            tracing::trace!(identity = %result.identity, distance = result.distance, "face matched");
            detections.push(Detection {
                bbox: native.face_box(),
                identity: result.identity,
                distance: result.distance,
                scale,
            });
        }

        detections
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale.min(1.0)
    } else {
        1.0
    }
}
