//! Test doubles for the backend and the frame source.

use crate::backend::{BackendError, EmbeddingBackend};
use crate::processor::{CaptureError, FrameSource};
use crate::recognizer::RecognizerError;
use crate::types::{BoundingBox, Embedding, Frame};
use std::collections::VecDeque;

/// Fill value for which [`FakeBackend::single_face`] detects no face.
pub const NO_FACE: u8 = 0;
/// Fill value for which [`FakeBackend::single_face`] detects two faces.
pub const TWO_FACES: u8 = 255;

type DetectFn = Box<dyn FnMut(&Frame) -> Result<Vec<BoundingBox>, BackendError> + Send>;
type EmbedFn = Box<dyn FnMut(&Frame, &BoundingBox) -> Result<Embedding, BackendError> + Send>;

pub struct FakeBackend {
    detect: DetectFn,
    embed: EmbedFn,
    pub detect_calls: usize,
    pub embed_calls: usize,
    /// Dimensions of every frame passed to `detect_faces`.
    pub detect_sizes: Vec<(u32, u32)>,
}

impl FakeBackend {
    pub fn new(
        detect: impl FnMut(&Frame) -> Result<Vec<BoundingBox>, BackendError> + Send + 'static,
        embed: impl FnMut(&Frame, &BoundingBox) -> Result<Embedding, BackendError> + Send + 'static,
    ) -> Self {
        Self {
            detect: Box::new(detect),
            embed: Box::new(embed),
            detect_calls: 0,
            embed_calls: 0,
            detect_sizes: Vec::new(),
        }
    }

    /// Face count decided by the first pixel (see [`NO_FACE`], [`TWO_FACES`]);
    /// the embedding is derived from the same pixel.
    pub fn single_face() -> Self {
        Self::new(
            |frame| {
                let count = match frame.data.first().copied() {
                    Some(NO_FACE) | None => 0,
                    Some(TWO_FACES) => 2,
                    Some(_) => 1,
                };
                Ok(vec![whole_frame_box(frame); count])
            },
            |frame, _| Ok(Self::embedding_for(frame.data[0])),
        )
    }

    /// Detects one face, fails every embedding.
    pub fn failing_embed() -> Self {
        Self::new(
            |frame| Ok(vec![whole_frame_box(frame)]),
            |_, _| Err(inference_error("embedding exploded")),
        )
    }

    pub fn embedding_for(value: u8) -> Embedding {
        Embedding::new(vec![value as f32 / 10.0, 0.0])
    }
}

impl EmbeddingBackend for FakeBackend {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        self.detect_calls += 1;
        self.detect_sizes.push((frame.width, frame.height));
        (self.detect)(frame)
    }

    fn embed(&mut self, frame: &Frame, region: &BoundingBox) -> Result<Embedding, BackendError> {
        self.embed_calls += 1;
        (self.embed)(frame, region)
    }
}

pub fn inference_error(msg: &str) -> BackendError {
    BackendError::Recognizer(RecognizerError::InferenceFailed(msg.to_string()))
}

pub fn face_box(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
    BoundingBox {
        x,
        y,
        width,
        height,
        confidence: 0.9,
        landmarks: None,
    }
}

fn whole_frame_box(frame: &Frame) -> BoundingBox {
    face_box(0.0, 0.0, frame.width as f32, frame.height as f32)
}

/// An 8×8 frame filled with `value`.
pub fn face_image(value: u8) -> Frame {
    Frame::new(vec![value; 64], 8, 8, 0)
}

/// Replays a fixed sequence of capture results, then reports the source gone.
pub struct ScriptedSource {
    script: VecDeque<Result<Frame, CaptureError>>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<Frame, CaptureError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(CaptureError::Unavailable("script exhausted".into())))
    }
}
