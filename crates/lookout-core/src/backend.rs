//! The face detection + embedding capability the pipeline consumes.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, Frame};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failure inside the detection/embedding backend. Reported per call;
/// never fatal to the processing loop.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("face embedding failed: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects face regions and turns one region into an embedding.
///
/// Implementations may hold inference sessions that need `&mut self`; the
/// owner (the capture worker) is the only caller.
pub trait EmbeddingBackend {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError>;

    fn embed(&mut self, frame: &Frame, region: &BoundingBox) -> Result<Embedding, BackendError>;
}

/// SCRFD detection + ArcFace recognition, both on ONNX Runtime.
pub struct OnnxBackend {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxBackend {
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, BackendError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Load `det_10g.onnx` and `w600k_r50.onnx` from a model directory.
    pub fn from_model_dir(dir: &Path) -> Result<Self, BackendError> {
        Self::load(&scrfd_model_path(dir), &arcface_model_path(dir))
    }
}

impl EmbeddingBackend for OnnxBackend {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        Ok(self.detector.detect(frame)?)
    }

    fn embed(&mut self, frame: &Frame, region: &BoundingBox) -> Result<Embedding, BackendError> {
        Ok(self.recognizer.extract(frame, region)?)
    }
}

/// Path to the SCRFD detection model inside `dir`.
pub fn scrfd_model_path(dir: &Path) -> String {
    dir.join("det_10g.onnx").to_string_lossy().into_owned()
}

/// Path to the ArcFace recognition model inside `dir`.
pub fn arcface_model_path(dir: &Path) -> String {
    dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
}

/// Default model directory: `$XDG_DATA_HOME/lookout/models`, else
/// `~/.local/share/lookout/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("lookout/models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths() {
        let dir = Path::new("/opt/models");
        assert_eq!(scrfd_model_path(dir), "/opt/models/det_10g.onnx");
        assert_eq!(arcface_model_path(dir), "/opt/models/w600k_r50.onnx");
    }

    #[test]
    fn test_missing_models_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxBackend::from_model_dir(dir.path()).err().unwrap();
        assert!(matches!(err, BackendError::Detector(DetectorError::ModelNotFound(_))));
    }
}
