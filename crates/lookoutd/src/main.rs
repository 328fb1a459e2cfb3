use anyhow::{Context, Result};
use lookout_core::{Gallery, MetadataStore, OnnxBackend, OverlayStyle};
use lookout_hw::Camera;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod enroll;
mod handoff;
mod store;

use config::Config;
use dbus_interface::LookoutService;
use engine::{spawn_engine, EngineSettings, EngineStatus};
use enroll::Enroller;
use store::SqliteStore;

const BUS_NAME: &str = "org.freedesktop.Lookout1";
const OBJECT_PATH: &str = "/org/freedesktop/Lookout1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lookoutd starting");
    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    let mut backend = OnnxBackend::from_model_dir(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    std::fs::create_dir_all(&config.enroll_dir)
        .with_context(|| format!("failed to create {}", config.enroll_dir.display()))?;
    let gallery = Arc::new(
        Gallery::build_from_dir(&config.enroll_dir, &mut backend)
            .context("failed to build gallery")?,
    );
    tracing::info!(enrolled = gallery.len(), "gallery ready");

    let sqlite = SqliteStore::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    tracing::info!(records = sqlite.count()?, "person store ready");
    let store: Arc<dyn MetadataStore> = Arc::new(sqlite);

    let mut camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    camera.warm_up(config.warmup_frames);

    let settings = EngineSettings {
        match_threshold: config.match_threshold,
        detection_scale: config.detection_scale,
        frame_interval: config.frame_interval,
        max_missed_frames: config.max_missed_frames,
    };
    let engine = spawn_engine(camera, backend, Arc::clone(&gallery), settings)?;
    let handle = engine.handle();

    let mut overlay = OverlayStyle::default();
    if let Some(path) = &config.font_path {
        match OverlayStyle::load_font(path) {
            Ok(font) => overlay = overlay.with_font(font),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "overlay font not loaded; using bundled font"),
        }
    }

    let service = LookoutService {
        engine: handle.clone(),
        enroller: Enroller::new(
            handle.clone(),
            Arc::clone(&gallery),
            Arc::clone(&store),
            config.enroll_dir.clone(),
        ),
        gallery,
        store,
        overlay,
        camera_device: config.camera_device.clone(),
        match_threshold: config.match_threshold,
    };

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, "lookoutd ready");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("lookoutd shutting down");
        }
        status = handle.finished() => {
            if let EngineStatus::Failed(reason) = &status {
                tracing::error!(reason, "capture engine failed");
            }
        }
    }

    let result = tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    result.context("capture engine ended with an error")?;
    Ok(())
}
