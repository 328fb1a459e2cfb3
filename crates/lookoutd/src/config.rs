use lookout_core::processor::{DEFAULT_DETECTION_SCALE, DEFAULT_MAX_MISSED_FRAMES};
use lookout_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of `<name>.jpg` enrollment photos, read at startup.
    pub enroll_dir: PathBuf,
    /// Path to the SQLite person-record database.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Downsample factor for detection, in (0, 1].
    pub detection_scale: f32,
    /// Pause between capture iterations.
    pub frame_interval: Duration,
    /// Consecutive failed captures before the camera counts as lost.
    pub max_missed_frames: u32,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// TTF/OTF font for overlay labels.
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `LOOKOUT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("lookout");

        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            camera_device: var("LOOKOUT_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: var("LOOKOUT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("models")),
            enroll_dir: var("LOOKOUT_ENROLL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("images")),
            db_path: var("LOOKOUT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("people.db")),
            match_threshold: parsed("LOOKOUT_MATCH_THRESHOLD")
                .filter(|t| t.is_finite() && *t >= 0.0)
                .map(|t| t as f32)
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
            detection_scale: parsed("LOOKOUT_DETECTION_SCALE")
                .map(|s| clamp_scale(s as f32))
                .unwrap_or(DEFAULT_DETECTION_SCALE),
            frame_interval: Duration::from_millis(
                parsed("LOOKOUT_FRAME_INTERVAL_MS")
                    .filter(|ms| ms.is_finite() && *ms >= 0.0)
                    .map(|ms| ms as u64)
                    .unwrap_or(10),
            ),
            max_missed_frames: parsed("LOOKOUT_MAX_MISSED_FRAMES")
                .filter(|n| *n >= 1.0)
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_MAX_MISSED_FRAMES),
            warmup_frames: parsed("LOOKOUT_WARMUP_FRAMES")
                .filter(|n| *n >= 0.0)
                .map(|n| n as usize)
                .unwrap_or(4),
            font_path: var("LOOKOUT_FONT_PATH").filter(|p| !p.is_empty()).map(PathBuf::from),
        }
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale.min(1.0)
    } else {
        DEFAULT_DETECTION_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[("HOME", "/home/op")]);
        assert_eq!(c.camera_device, "/dev/video0");
        assert_eq!(c.enroll_dir, PathBuf::from("/home/op/.local/share/lookout/images"));
        assert_eq!(c.db_path, PathBuf::from("/home/op/.local/share/lookout/people.db"));
        assert_eq!(c.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(c.detection_scale, DEFAULT_DETECTION_SCALE);
        assert_eq!(c.frame_interval, Duration::from_millis(10));
        assert_eq!(c.warmup_frames, 4);
        assert_eq!(c.max_missed_frames, DEFAULT_MAX_MISSED_FRAMES);
        assert!(c.font_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("XDG_DATA_HOME", "/data"),
            ("LOOKOUT_CAMERA_DEVICE", "/dev/video2"),
            ("LOOKOUT_MATCH_THRESHOLD", "0.6"),
            ("LOOKOUT_DETECTION_SCALE", "0.25"),
            ("LOOKOUT_FRAME_INTERVAL_MS", "33"),
            ("LOOKOUT_FONT_PATH", "/usr/share/fonts/DejaVuSans.ttf"),
        ]);
        assert_eq!(c.camera_device, "/dev/video2");
        assert_eq!(c.model_dir, PathBuf::from("/data/lookout/models"));
        assert!((c.match_threshold - 0.6).abs() < 1e-6);
        assert_eq!(c.detection_scale, 0.25);
        assert_eq!(c.frame_interval, Duration::from_millis(33));
        assert!(c.font_path.is_some());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let c = config(&[
            ("LOOKOUT_MATCH_THRESHOLD", "close"),
            ("LOOKOUT_DETECTION_SCALE", "4.0"),
            ("LOOKOUT_WARMUP_FRAMES", "-3"),
            ("LOOKOUT_MAX_MISSED_FRAMES", "0"),
        ]);
        assert_eq!(c.max_missed_frames, DEFAULT_MAX_MISSED_FRAMES);
        assert_eq!(c.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(c.detection_scale, 1.0);
        assert_eq!(c.warmup_frames, 4);

        let c = config(&[("LOOKOUT_DETECTION_SCALE", "0")]);
        assert_eq!(c.detection_scale, DEFAULT_DETECTION_SCALE);
    }
}
