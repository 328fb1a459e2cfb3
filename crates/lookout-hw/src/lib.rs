//! lookout-hw: V4L2 camera capture for the Lookout pipeline.
//!
//! The camera negotiates a grayscale-convertible format, converts every
//! buffer to 8-bit luma and implements `lookout_core::FrameSource`.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
