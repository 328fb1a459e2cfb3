//! The set of known identities and their embeddings.
//!
//! Readers take an immutable snapshot; writers build a new map and swap it
//! in, so a match never sees a half-applied enrollment.

use crate::backend::{BackendError, EmbeddingBackend};
use crate::types::{Embedding, Frame};
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Extensions accepted when scanning an enrollment directory.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// Immutable identity → embedding map, sorted by identity.
pub type GallerySnapshot = BTreeMap<String, Embedding>;

#[derive(Error, Debug)]
pub enum EnrollError {
    /// Zero faces, or more than one (ambiguous enrollment).
    #[error("expected exactly one face in the enrollment image, found {faces}")]
    NoFaceDetected { faces: usize },
    #[error("embedding backend error: {0}")]
    EmbeddingBackendError(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read enrollment directory {path}: {source}")]
    ReadDir {
        path: String,
        source: std::io::Error,
    },
}

/// Whether an enrollment created a new identity or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Added,
    Replaced,
}

/// Shared, concurrently readable gallery.
pub struct Gallery {
    current: ArcSwap<GallerySnapshot>,
    /// Serializes writers; readers never take it.
    write_lock: Mutex<()>,
}

impl Default for Gallery {
    fn default() -> Self {
        Self::from_snapshot(GallerySnapshot::new())
    }
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("identities", &self.identities())
            .finish()
    }
}

impl Gallery {
    pub fn from_snapshot(snapshot: GallerySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
        }
    }

    /// Embed every `(identity, image)` pair. Images without exactly one
    /// usable face are skipped with a warning; later images for the same
    /// identity overwrite earlier ones.
    pub fn build<B, I>(images: I, backend: &mut B) -> Self
    where
        B: EmbeddingBackend + ?Sized,
        I: IntoIterator<Item = (String, Frame)>,
    {
        let mut entries = GallerySnapshot::new();
        for (identity, image) in images {
            match enrollment_embedding(&image, backend) {
                Ok(embedding) => {
                    entries.insert(identity, embedding);
                }
                Err(e) => {
                    tracing::warn!(identity = %identity, error = %e, "skipping enrollment image");
                }
            }
        }
        tracing::info!(identities = entries.len(), "gallery built");
        Self::from_snapshot(entries)
    }

    /// Build from a directory of `<identity>.<ext>` images.
    pub fn build_from_dir<B>(dir: &Path, backend: &mut B) -> Result<Self, GalleryError>
    where
        B: EmbeddingBackend + ?Sized,
    {
        let read_dir = std::fs::read_dir(dir).map_err(|source| GalleryError::ReadDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<_> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        let images = paths.into_iter().filter_map(|path| {
            let identity = path.file_stem()?.to_string_lossy().into_owned();
            match load_frame(&path) {
                Ok(frame) => Some((identity, frame)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                    None
                }
            }
        });

        Ok(Self::build(images, backend))
    }

    /// The current immutable view. Cheap; never blocks on writers.
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.current.load().contains_key(identity)
    }

    pub fn identities(&self) -> Vec<String> {
        self.current.load().keys().cloned().collect()
    }

    /// Compute an embedding from `image` and publish it under `identity`.
    pub fn enroll<B>(
        &self,
        identity: &str,
        image: &Frame,
        backend: &mut B,
    ) -> Result<EnrollOutcome, EnrollError>
    where
        B: EmbeddingBackend + ?Sized,
    {
        let embedding = enrollment_embedding(image, backend)?;
        Ok(self.insert(identity, embedding))
    }

    /// Publish an already-validated embedding. Overwrites silently at this
    /// layer; the outcome tells the caller whether it did.
    pub fn insert(&self, identity: &str, embedding: Embedding) -> EnrollOutcome {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = GallerySnapshot::clone(&self.current.load());
        let outcome = match next.insert(identity.to_string(), embedding) {
            Some(_) => EnrollOutcome::Replaced,
            None => EnrollOutcome::Added,
        };
        self.current.store(Arc::new(next));
        tracing::info!(identity, ?outcome, "gallery entry published");
        outcome
    }
}

/// Validate an enrollment image (exactly one face) and embed that face.
pub fn enrollment_embedding<B>(image: &Frame, backend: &mut B) -> Result<Embedding, EnrollError>
where
    B: EmbeddingBackend + ?Sized,
{
    let faces = backend.detect_faces(image)?;
    match faces.as_slice() {
        [face] => Ok(backend.embed(image, face)?),
        _ => Err(EnrollError::NoFaceDetected { faces: faces.len() }),
    }
}

/// Decode an image file into a grayscale frame.
pub fn load_frame(path: &Path) -> Result<Frame, image::ImageError> {
    Ok(Frame::from_luma(image::open(path)?.to_luma8(), 0))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
