//! Map a click in native frame coordinates to a detection and its record.

use crate::metadata::{MetadataStore, PersonRecord, StoreError};
use crate::types::{Detection, Identity};
use serde::Serialize;

/// Identity of the first detection whose box contains `(x, y)`.
///
/// Boxes may overlap; list order decides. Containment is half-open, so a
/// click on a box's right or bottom edge misses it.
pub fn resolve(x: f32, y: f32, detections: &[Detection]) -> Option<&Identity> {
    hit(x, y, detections).map(|d| &d.identity)
}

/// The first detection whose box contains `(x, y)`.
pub fn hit(x: f32, y: f32, detections: &[Detection]) -> Option<&Detection> {
    detections.iter().find(|d| d.bbox.contains(x, y))
}

/// Everything a click can lead to. Each case is reported separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// The click hit no face.
    NoIdentityResolved,
    /// The click hit a face that matched nobody in the gallery.
    UnknownFace { distance: f32 },
    /// The face is known but the store has no record for it.
    MetadataNotFound { identity: String },
    Found { record: PersonRecord },
    StoreError { message: String },
}

impl ClickOutcome {
    /// Text suitable for an operator-facing dialog.
    pub fn message(&self) -> String {
        match self {
            ClickOutcome::NoIdentityResolved => "No face at that position.".to_string(),
            ClickOutcome::UnknownFace { .. } => "Face not recognized.".to_string(),
            ClickOutcome::MetadataNotFound { identity } => {
                format!("No information found for {identity}.")
            }
            ClickOutcome::Found { record } => record.details(),
            ClickOutcome::StoreError { message } => format!("Error reading details: {message}"),
        }
    }
}

/// Hit-test a click and look up the person behind it.
pub fn dispatch(x: f32, y: f32, detections: &[Detection], store: &dyn MetadataStore) -> ClickOutcome {
    let Some(detection) = hit(x, y, detections) else {
        return ClickOutcome::NoIdentityResolved;
    };
    match &detection.identity {
        Identity::Unknown => ClickOutcome::UnknownFace {
            distance: detection.distance,
        },
        Identity::Known(name) => lookup_person(name, store),
    }
}

/// Look up a name typed by the operator or resolved from a click.
pub fn lookup_person(name: &str, store: &dyn MetadataStore) -> ClickOutcome {
    match store.lookup(name) {
        Ok(record) => ClickOutcome::Found { record },
        Err(StoreError::NotFound(identity)) => ClickOutcome::MetadataNotFound { identity },
        Err(e) => {
            tracing::warn!(name, error = %e, "metadata lookup failed");
            ClickOutcome::StoreError {
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryStore;
    use crate::types::FaceBox;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32, identity: Identity) -> Detection {
        Detection {
            bbox: FaceBox { x1, y1, x2, y2 },
            identity,
            distance: 0.25,
            scale: 0.25,
        }
    }

    fn known(name: &str) -> Identity {
        Identity::Known(name.to_string())
    }

    #[test]
    fn test_overlapping_boxes_first_listed_wins() {
        // The small box is listed first; the large one encloses it.
        let dets = vec![
            detection(40.0, 40.0, 60.0, 60.0, known("small")),
            detection(0.0, 0.0, 200.0, 200.0, known("large")),
        ];
        assert_eq!(resolve(50.0, 50.0, &dets), Some(&known("small")));

        let swapped: Vec<_> = dets.into_iter().rev().collect();
        assert_eq!(resolve(50.0, 50.0, &swapped), Some(&known("large")));
    }

    #[test]
    fn test_upper_left_boundary_is_inside() {
        let dets = vec![detection(10.0, 20.0, 30.0, 40.0, known("alice"))];
        assert_eq!(resolve(10.0, 20.0, &dets), Some(&known("alice")));
    }

    #[test]
    fn test_lower_right_boundary_is_outside() {
        let dets = vec![detection(10.0, 20.0, 30.0, 40.0, known("alice"))];
        assert_eq!(resolve(30.0, 40.0, &dets), None);
        assert_eq!(resolve(30.0, 25.0, &dets), None);
        assert_eq!(resolve(15.0, 40.0, &dets), None);
    }

    #[test]
    fn test_miss() {
        let dets = vec![detection(10.0, 20.0, 30.0, 40.0, known("alice"))];
        assert_eq!(resolve(5.0, 5.0, &dets), None);
        assert_eq!(resolve(5.0, 5.0, &[]), None);
    }

    #[test]
    fn test_dispatch_outcomes_are_distinct() {
        let store = MemoryStore::new();
        store
            .append(&PersonRecord {
                name: "alice".into(),
                erp_id: "E100".into(),
                branch: "ECE".into(),
                gender: "F".into(),
            })
            .unwrap();
        let dets = vec![
            detection(0.0, 0.0, 10.0, 10.0, known("alice")),
            detection(20.0, 0.0, 30.0, 10.0, known("bob")),
            detection(40.0, 0.0, 50.0, 10.0, Identity::Unknown),
        ];

        match dispatch(5.0, 5.0, &dets, &store) {
            ClickOutcome::Found { record } => assert_eq!(record.erp_id, "E100"),
            other => panic!("expected Found, got {other:?}"),
        }
        assert_eq!(
            dispatch(25.0, 5.0, &dets, &store),
            ClickOutcome::MetadataNotFound { identity: "bob".into() }
        );
        assert_eq!(
            dispatch(45.0, 5.0, &dets, &store),
            ClickOutcome::UnknownFace { distance: 0.25 }
        );
        assert_eq!(dispatch(100.0, 100.0, &dets, &store), ClickOutcome::NoIdentityResolved);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ClickOutcome::MetadataNotFound { identity: "bob".into() }.message(),
            "No information found for bob."
        );
        assert!(ClickOutcome::Found {
            record: PersonRecord {
                name: "alice".into(),
                erp_id: "E1".into(),
                branch: "B".into(),
                gender: "F".into(),
            }
        }
        .message()
        .starts_with("Person Name: alice\nERP ID: E1"));
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(ClickOutcome::MetadataNotFound { identity: "bob".into() }).unwrap();
        assert_eq!(json["outcome"], "metadata_not_found");
        assert_eq!(json["identity"], "bob");
    }
}
