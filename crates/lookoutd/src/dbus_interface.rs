use crate::engine::{EngineHandle, EngineStatus};
use crate::enroll::{EnrollRequest, Enroller};
use crate::handoff::LatestFrame;
use lookout_core::{
    dispatch, lookup_person, render, ClickOutcome, EnrollOutcome, Gallery, MetadataStore,
    OverlayStyle, PersonRecord,
};
use serde_json::json;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the Lookout identification daemon.
///
/// Bus name: org.freedesktop.Lookout1
/// Object path: /org/freedesktop/Lookout1
pub struct LookoutService {
    pub engine: EngineHandle,
    pub enroller: Enroller,
    pub gallery: Arc<Gallery>,
    pub store: Arc<dyn MetadataStore>,
    pub overlay: OverlayStyle,
    pub camera_device: String,
    pub match_threshold: f32,
}

#[interface(name = "org.freedesktop.Lookout1")]
impl LookoutService {
    /// Resolve a click at native frame coordinates against the latest
    /// detections and return the outcome as JSON.
    async fn click(&self, x: f64, y: f64) -> zbus::fdo::Result<String> {
        let outcome = click_outcome(x as f32, y as f32, &self.engine.latest(), self.store.as_ref());
        tracing::info!(x, y, outcome = ?outcome, "click resolved");
        Ok(outcome_json(&outcome).to_string())
    }

    /// Look up a person by name.
    async fn person_details(&self, name: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "person details requested");
        let outcome = lookup_person(name.trim(), self.store.as_ref());
        Ok(outcome_json(&outcome).to_string())
    }

    /// Enroll a person from a photo on the daemon's filesystem.
    async fn enroll(
        &self,
        name: &str,
        erp_id: &str,
        branch: &str,
        gender: &str,
        image_path: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, image_path, "enroll requested");
        let request = EnrollRequest {
            record: PersonRecord {
                name: name.to_string(),
                erp_id: erp_id.to_string(),
                branch: branch.to_string(),
                gender: gender.to_string(),
            },
            image_path: PathBuf::from(image_path),
        };
        match self.enroller.enroll(request).await {
            Ok(EnrollOutcome::Added) => Ok(format!("Enrolled {name}.")),
            Ok(EnrollOutcome::Replaced) => Ok(format!("Updated {name}; previous enrollment replaced.")),
            Err(e) => {
                tracing::warn!(name, error = %e, "enrollment failed");
                Err(zbus::fdo::Error::Failed(e.to_string()))
            }
        }
    }

    /// Latest detections as JSON, in native frame coordinates.
    async fn detections(&self) -> zbus::fdo::Result<String> {
        Ok(detections_json(&self.engine.latest()).to_string())
    }

    /// PNG of the latest frame with boxes and labels drawn on it.
    async fn snapshot(&self) -> zbus::fdo::Result<Vec<u8>> {
        let Some(latest) = self.engine.latest() else {
            return Err(zbus::fdo::Error::Failed("no frame captured yet".into()));
        };
        let style = self.overlay.clone();
        tokio::task::spawn_blocking(move || {
            let image = render(&latest.frame, &latest.detections, &style);
            encode_png(image)
        })
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("render task failed: {e}")))?
        .map_err(|e| zbus::fdo::Error::Failed(format!("PNG encoding failed: {e}")))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let latest = self.engine.latest();
        let engine = match self.engine.status() {
            EngineStatus::Running => "running".to_string(),
            EngineStatus::Stopped => "stopped".to_string(),
            EngineStatus::Failed(reason) => format!("failed: {reason}"),
        };
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.camera_device,
            "engine": engine,
            "enrolled": self.gallery.len(),
            "match_threshold": self.match_threshold,
            "last_sequence": latest.as_ref().map(|l| l.frame.sequence),
            "faces_in_view": latest.as_ref().map(|l| l.detections.len()).unwrap_or(0),
        })
        .to_string())
    }
}

fn click_outcome(x: f32, y: f32, latest: &LatestFrame, store: &dyn MetadataStore) -> ClickOutcome {
    match latest {
        Some(latest) => dispatch(x, y, &latest.detections, store),
        None => ClickOutcome::NoIdentityResolved,
    }
}

fn outcome_json(outcome: &ClickOutcome) -> serde_json::Value {
    json!({
        "result": outcome,
        "message": outcome.message(),
    })
}

fn detections_json(latest: &LatestFrame) -> serde_json::Value {
    match latest {
        Some(latest) => json!({
            "sequence": latest.frame.sequence,
            "width": latest.frame.width,
            "height": latest.frame.height,
            "detections": latest.detections,
        }),
        None => json!({ "sequence": null, "detections": [] }),
    }
}

fn encode_png(image: image::RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image).write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::{Detection, FaceBox, Frame, Identity, MemoryStore, ProcessedFrame};

    fn latest(detections: Vec<Detection>) -> LatestFrame {
        Some(Arc::new(ProcessedFrame {
            frame: Frame::new(vec![0u8; 100 * 80], 100, 80, 12),
            detections,
        }))
    }

    fn detection(name: Option<&str>, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: FaceBox { x1, y1, x2, y2 },
            identity: name.map_or(Identity::Unknown, |n| Identity::Known(n.to_string())),
            distance: 0.4,
            scale: 0.5,
        }
    }

    fn store_with(name: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .append(&PersonRecord {
                name: name.into(),
                erp_id: "E9".into(),
                branch: "EEE".into(),
                gender: "F".into(),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_click_before_first_frame() {
        let outcome = click_outcome(5.0, 5.0, &None, &MemoryStore::new());
        assert_eq!(outcome, ClickOutcome::NoIdentityResolved);
    }

    #[test]
    fn test_click_found_json() {
        let store = store_with("hana");
        let frame = latest(vec![detection(Some("hana"), 10.0, 10.0, 50.0, 50.0)]);
        let value = outcome_json(&click_outcome(20.0, 20.0, &frame, &store));
        assert_eq!(value["result"]["outcome"], "found");
        assert_eq!(value["result"]["record"]["erp_id"], "E9");
        assert!(value["message"].as_str().unwrap().starts_with("Person Name: hana"));
    }

    #[test]
    fn test_click_unknown_and_miss_are_distinct() {
        let store = store_with("hana");
        let frame = latest(vec![detection(None, 10.0, 10.0, 50.0, 50.0)]);
        let unknown = outcome_json(&click_outcome(20.0, 20.0, &frame, &store));
        let miss = outcome_json(&click_outcome(90.0, 70.0, &frame, &store));
        assert_eq!(unknown["result"]["outcome"], "unknown_face");
        assert_eq!(miss["result"]["outcome"], "no_identity_resolved");
    }

    #[test]
    fn test_detections_json() {
        let value = detections_json(&latest(vec![detection(Some("ivy"), 1.0, 2.0, 3.0, 4.0)]));
        assert_eq!(value["sequence"], 12);
        assert_eq!(value["detections"][0]["identity"], "ivy");
        assert_eq!(value["detections"][0]["scale"], 0.5);

        let empty = detections_json(&None);
        assert!(empty["sequence"].is_null());
        assert_eq!(empty["detections"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(image::RgbImage::new(4, 3)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }
}
