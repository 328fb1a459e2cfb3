//! "Add person": photo, embedding, record and gallery entry in one step.

use crate::engine::{EngineError, EngineHandle};
use lookout_core::{EnrollOutcome, Frame, Gallery, MetadataStore, PersonRecord, StoreError};
use lookout_core::gallery::IMAGE_EXTENSIONS;
use lookout_core::types::UNKNOWN_LABEL;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("failed to read image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error(transparent)]
    Embedding(#[from] EngineError),
    #[error("failed to save photo {path}: {reason}")]
    SavePhoto { path: PathBuf, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One "add person" submission.
#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub record: PersonRecord,
    pub image_path: PathBuf,
}

/// Runs enrollments against the live gallery, the person store and the
/// enrollment photo directory.
pub struct Enroller {
    engine: EngineHandle,
    gallery: Arc<Gallery>,
    store: Arc<dyn MetadataStore>,
    enroll_dir: PathBuf,
    /// One enrollment at a time, so photo, record and embedding agree.
    in_progress: Mutex<()>,
}

impl Enroller {
    pub fn new(
        engine: EngineHandle,
        gallery: Arc<Gallery>,
        store: Arc<dyn MetadataStore>,
        enroll_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            gallery,
            store,
            enroll_dir,
            in_progress: Mutex::new(()),
        }
    }

    /// Enroll a person. Either every side effect lands or none does.
    pub async fn enroll(&self, request: EnrollRequest) -> Result<EnrollOutcome, EnrollmentError> {
        let name = request.record.name.clone();
        validate_name(&name)?;
        let _serial = self.in_progress.lock().await;

        let image = image::open(&request.image_path).map_err(|source| EnrollmentError::ImageLoad {
            path: request.image_path.clone(),
            source,
        })?;
        let frame = Frame::from_luma(image.to_luma8(), 0);
        let embedding = self.engine.enrollment_embedding(frame).await?;

        let photo = PhotoWrite::save(&self.enroll_dir, &name, &image)?;
        if let Err(e) = self.store.append(&request.record) {
            photo.roll_back();
            return Err(e.into());
        }
        photo.commit();

        let outcome = self.gallery.insert(&name, embedding);
        if outcome == EnrollOutcome::Replaced {
            tracing::warn!(name, "re-enrollment replaced an existing gallery entry");
        }
        tracing::info!(name, ?outcome, "person enrolled");
        Ok(outcome)
    }
}

/// Names become file stems and gallery keys.
pub fn validate_name(name: &str) -> Result<(), EnrollmentError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name.eq_ignore_ascii_case(UNKNOWN_LABEL)
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(EnrollmentError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A saved enrollment photo that can still be undone.
///
/// Every earlier photo for the same name (any image extension) is moved
/// aside first, so the directory never holds two photos for one identity.
struct PhotoWrite {
    path: PathBuf,
    /// (original, moved-aside) pairs.
    backups: Vec<(PathBuf, PathBuf)>,
}

impl PhotoWrite {
    fn save(dir: &Path, name: &str, image: &image::DynamicImage) -> Result<Self, EnrollmentError> {
        let path = dir.join(format!("{name}.jpg"));
        let save_err = |reason: String| EnrollmentError::SavePhoto {
            path: path.clone(),
            reason,
        };

        std::fs::create_dir_all(dir).map_err(|e| save_err(e.to_string()))?;

        let mut write = PhotoWrite {
            path: path.clone(),
            backups: Vec::new(),
        };
        for original in existing_photos(dir, name).map_err(|e| save_err(e.to_string()))? {
            let mut aside = original.clone().into_os_string();
            aside.push(".bak");
            let aside = PathBuf::from(aside);
            if let Err(e) = std::fs::rename(&original, &aside) {
                write.roll_back();
                return Err(save_err(e.to_string()));
            }
            write.backups.push((original, aside));
        }

        if let Err(e) = image
            .to_rgb8()
            .save_with_format(&path, image::ImageFormat::Jpeg)
        {
            write.roll_back();
            return Err(save_err(e.to_string()));
        }
        tracing::debug!(path = %path.display(), replaced = write.backups.len(), "enrollment photo saved");
        Ok(write)
    }

    fn roll_back(self) {
        let _ = std::fs::remove_file(&self.path);
        for (original, aside) in &self.backups {
            if let Err(e) = std::fs::rename(aside, original) {
                tracing::error!(path = %original.display(), error = %e, "failed to restore previous photo");
            }
        }
        tracing::debug!(path = %self.path.display(), "enrollment photo rolled back");
    }

    fn commit(self) {
        for (_, aside) in &self.backups {
            let _ = std::fs::remove_file(aside);
        }
    }
}

/// Image files in `dir` whose stem is `name`.
fn existing_photos(dir: &Path, name: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let same_stem = path.file_stem() == Some(std::ffi::OsStr::new(name));
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if same_stem && is_image && path.is_file() {
            found.push(path);
        }
    }
    Ok(found)
}
