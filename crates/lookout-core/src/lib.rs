//! lookout-core: live face identification engine.
//!
//! SCRFD detection and ArcFace embeddings on ONNX Runtime, a copy-on-write
//! gallery with Euclidean nearest-neighbour matching, the per-frame
//! processor, overlay rendering and click hit-testing.

pub mod alignment;
pub mod backend;
pub mod detector;
pub mod gallery;
pub mod hit_test;
pub mod matcher;
pub mod metadata;
pub mod overlay;
pub mod processor;
pub mod recognizer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{default_model_dir, BackendError, EmbeddingBackend, OnnxBackend};
pub use gallery::{EnrollError, EnrollOutcome, Gallery, GallerySnapshot};
pub use hit_test::{dispatch, lookup_person, resolve, ClickOutcome};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use metadata::{MemoryStore, MetadataStore, PersonRecord, StoreError};
pub use overlay::{render, OverlayStyle};
pub use processor::{
    CaptureError, FrameOutcome, FrameProcessor, FrameSource, PipelineError, ProcessedFrame,
};
pub use types::{BoundingBox, Detection, Embedding, FaceBox, Frame, Identity};
