use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Label rendered and reported for faces that matched no gallery entry.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Raw detector output for one face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map a box found on a frame downsampled by `scale` back to the native frame.
    pub fn unscale(&self, scale: f32) -> BoundingBox {
        let inv = 1.0 / scale;
        BoundingBox {
            x: self.x * inv,
            y: self.y * inv,
            width: self.width * inv,
            height: self.height * inv,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * inv, ly * inv))),
        }
    }

    pub fn face_box(&self) -> FaceBox {
        FaceBox {
            x1: self.x,
            y1: self.y,
            x2: self.x + self.width,
            y2: self.y + self.height,
        }
    }
}

/// Corner-form box in native frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl FaceBox {
    /// Half-open containment: the upper-left edge is inside, the lower-right is not.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.x1 <= x && x < self.x2 && self.y1 <= y && y < self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings. Smaller = more similar.
    ///
    /// Embeddings of different dimensionality never match: the distance is
    /// infinite rather than computed over the shorter prefix.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Who a detected face was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn as_str(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One located, identity-labelled face within a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Box in native source-frame coordinates.
    pub bbox: FaceBox,
    pub identity: Identity,
    /// Distance to the closest gallery entry, reported even for unknown faces.
    pub distance: f32,
    /// Downsample factor the detector ran at; `bbox` has already been divided by it.
    pub scale: f32,
}

/// A grayscale frame at native source resolution.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    /// Monotonic per-source frame counter.
    pub sequence: u64,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    pub fn from_luma(image: GrayImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, sequence)
    }

    /// Borrow-free copy as an `image` buffer. `None` if the buffer is short.
    pub fn to_luma(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Resize by `scale` for faster detection. `scale >= 1.0` returns a clone.
    pub fn downsample(&self, scale: f32) -> Frame {
        if scale >= 1.0 {
            return self.clone();
        }
        let Some(image) = self.to_luma() else {
            return self.clone();
        };
        let w = ((self.width as f32 * scale).round() as u32).max(1);
        let h = ((self.height as f32 * scale).round() as u32).max(1);
        let small = imageops::resize(&image, w, h, FilterType::Triangle);
        Frame {
            data: small.into_raw(),
            width: w,
            height: h,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}
