use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lookout_hw::Camera;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lookout", about = "Lookout live face identification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a person (or replace their enrollment) from a photo
    Enroll {
        /// Person name; also the gallery identity
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        erp_id: String,
        #[arg(long)]
        branch: String,
        #[arg(long)]
        gender: String,
        /// Photo containing exactly one face
        image: PathBuf,
    },
    /// Show the stored details for a person
    Details {
        name: String,
    },
    /// Identify whoever is at (x, y) in the live frame
    Click {
        x: f64,
        y: f64,
    },
    /// Print the latest detections as JSON
    Detections,
    /// Save the latest annotated frame as PNG
    Snapshot {
        #[arg(short, long, default_value = "lookout-snapshot.png")]
        out: PathBuf,
    },
    /// Show daemon status
    Status,
    /// Run camera diagnostics
    Test {
        /// V4L2 device to capture from
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Where to write the captured frame
        #[arg(short, long, default_value = "lookout-test.png")]
        out: PathBuf,
    },
}

#[zbus::proxy(
    interface = "org.freedesktop.Lookout1",
    default_service = "org.freedesktop.Lookout1",
    default_path = "/org/freedesktop/Lookout1"
)]
trait Lookout {
    async fn click(&self, x: f64, y: f64) -> zbus::Result<String>;
    async fn person_details(&self, name: &str) -> zbus::Result<String>;
    async fn enroll(
        &self,
        name: &str,
        erp_id: &str,
        branch: &str,
        gender: &str,
        image_path: &str,
    ) -> zbus::Result<String>;
    async fn detections(&self) -> zbus::Result<String>;
    async fn snapshot(&self) -> zbus::Result<Vec<u8>>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn connect() -> Result<LookoutProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    LookoutProxy::new(&conn)
        .await
        .context("lookoutd is not reachable on the session bus")
}

/// Print the human-readable message from a click or details reply.
fn print_outcome(reply: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(reply).context("malformed daemon reply")?;
    match value["message"].as_str() {
        Some(message) => println!("{message}"),
        None => println!("{reply}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll {
            name,
            erp_id,
            branch,
            gender,
            image,
        } => {
            // The daemon resolves paths against its own working directory.
            let image = std::fs::canonicalize(&image)
                .with_context(|| format!("cannot read {}", image.display()))?;
            let Some(image) = image.to_str() else {
                bail!("image path is not valid UTF-8: {}", image.display());
            };
            let proxy = connect().await?;
            let reply = proxy.enroll(&name, &erp_id, &branch, &gender, image).await?;
            println!("{reply}");
        }
        Commands::Details { name } => {
            let proxy = connect().await?;
            print_outcome(&proxy.person_details(&name).await?)?;
        }
        Commands::Click { x, y } => {
            let proxy = connect().await?;
            print_outcome(&proxy.click(x, y).await?)?;
        }
        Commands::Detections => {
            let proxy = connect().await?;
            let reply: serde_json::Value = serde_json::from_str(&proxy.detections().await?)?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Commands::Snapshot { out } => {
            let proxy = connect().await?;
            let png = proxy.snapshot().await?;
            std::fs::write(&out, &png).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Saved snapshot to {}", out.display());
        }
        Commands::Status => match connect().await {
            Ok(proxy) => {
                let reply: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
                println!("{}", serde_json::to_string_pretty(&reply)?);
            }
            Err(e) => {
                tracing::debug!(error = %e, "status query failed");
                println!("lookoutd: not connected");
            }
        },
        Commands::Test { device, out } => run_camera_test(&device, &out)?,
    }

    Ok(())
}

/// Capture one frame directly from the camera, bypassing the daemon.
fn run_camera_test(device: &str, out: &Path) -> Result<()> {
    println!("Running camera diagnostics...");

    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for info in &devices {
        println!("  {}: {} ({}, {})", info.path, info.name, info.driver, info.bus);
    }

    let mut camera = Camera::open(device).with_context(|| format!("failed to open {device}"))?;
    println!(
        "Opened {device}: {}x{} {:?}",
        camera.width, camera.height, camera.fourcc
    );
    camera.warm_up(4);

    let frame = camera.capture_frame()?;
    let mean = frame.data.iter().map(|&p| p as f64).sum::<f64>() / frame.data.len().max(1) as f64;
    println!("Captured frame #{} (mean brightness {mean:.1})", frame.sequence);

    let Some(gray) = frame.to_luma() else {
        bail!("captured frame has inconsistent dimensions");
    };
    gray.save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Saved frame to {}", out.display());
    Ok(())
}
