//! Nearest-neighbour identity resolution against a gallery snapshot.

use crate::gallery::GallerySnapshot;
use crate::types::{Embedding, Identity};

/// Default Euclidean threshold for L2-normalized ArcFace embeddings.
///
/// For unit vectors `d² = 2 − 2·cos`, so 1.10 corresponds to a cosine
/// similarity of about 0.40.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the closest entry, reported even when it is over threshold.
    /// Infinite for an empty gallery.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_known()
    }
}

/// Strategy for comparing a query embedding against a gallery snapshot.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &GallerySnapshot, threshold: f32) -> MatchResult;
}

/// Linear-scan Euclidean matcher.
///
/// Visits every entry; exact distance ties resolve to the lexicographically
/// smaller identity, so results are reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &GallerySnapshot, threshold: f32) -> MatchResult {
        let mut best: Option<(&str, f32)> = None;

        for (identity, embedding) in gallery {
            let distance = query.euclidean_distance(embedding);
            let better = match best {
                None => true,
                Some((best_id, best_distance)) => {
                    distance < best_distance
                        || (distance == best_distance && identity.as_str() < best_id)
                }
            };
            if better {
                best = Some((identity.as_str(), distance));
            }
        }

        match best {
            Some((identity, distance)) if distance <= threshold => MatchResult {
                identity: Identity::Known(identity.to_string()),
                distance,
            },
            Some((_, distance)) => MatchResult {
                identity: Identity::Unknown,
                distance,
            },
            None => MatchResult {
                identity: Identity::Unknown,
                distance: f32::INFINITY,
            },
        }
    }
}
