use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hearhere_mini::audio::{drop_filename, probe_duration, ClipConfig, ClipRecorder, WavSource};
use hearhere_mini::{
    create_router, AppState, AudioDrop, AudioRef, AudioStorage, CloudMirror, Config, Coordinate,
    DropStore, JsonDropRepository, Materialized, NatsRemoteSource, StoreHandle,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hearhere")]
#[command(about = "Location-tagged voice notes")]
struct Args {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/hearhere")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API with periodic cloud sync
    Serve,

    /// Print every drop, oldest first
    List,

    /// Print drops near a position, nearest first
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Radius in metres
        #[arg(long, default_value = "500")]
        within: f64,
    },

    /// Add an existing audio file as a drop
    Import {
        file: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Clip length in seconds; probed from the file when omitted
        #[arg(long)]
        duration: Option<f64>,
        /// Store the audio inside the record instead of the audio directory
        #[arg(long)]
        inline: bool,
    },

    /// Record a clip from a WAV capture, capped at the configured maximum length
    Record {
        wav: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Delete a drop locally
    Remove { id: Uuid },

    /// Fetch from the cloud and reconcile
    Sync,

    /// Upload every local drop to the cloud
    Push,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("HearHere Mini v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Data directory: {}", cfg.storage.data_dir().display());

    let storage = AudioStorage::new(cfg.storage.audio_path());
    storage.ensure_dir()?;

    let repository = JsonDropRepository::new(cfg.storage.drops_path());
    let store = DropStore::open(Box::new(repository), cfg.sync.policy);
    let (handle, store_task) = StoreHandle::spawn(store);
    let cloud = connect_cloud(&cfg, storage.clone()).await;

    match args.command {
        Command::Serve => serve(&cfg, handle.clone(), cloud).await?,
        Command::List => print_drops(&handle.snapshot().await?),
        Command::Nearby { lat, lon, within } => {
            let center = Coordinate::new(lat, lon);
            if !center.is_valid() {
                bail!("Invalid coordinate: {}, {}", lat, lon);
            }
            print_drops(&handle.nearby(center, within).await?);
        }
        Command::Import {
            file,
            lat,
            lon,
            duration,
            inline,
        } => {
            let coordinate = Coordinate::new(lat, lon);
            let drop = import(&handle, &cloud, &file, coordinate, duration, inline).await?;
            println!("{}", drop.id);
        }
        Command::Record { wav, lat, lon } => {
            let coordinate = Coordinate::new(lat, lon);
            if !coordinate.is_valid() {
                bail!("Invalid coordinate: {}, {}", lat, lon);
            }

            let recorder = ClipRecorder::new(ClipConfig {
                output_dir: storage.base_dir().to_path_buf(),
                max_duration: cfg.recording.max_duration(),
            })?;
            let recording = recorder.record(WavSource::open(&wav)?.stream(100)).await?;
            let drop = handle.record(&recording, coordinate).await?;

            if let Err(e) = cloud.save(&drop).await {
                warn!("Drop {} stored locally but not mirrored: {}", drop.id, e);
            }
            println!("{}", drop.id);
        }
        Command::Remove { id } => match handle.remove(id).await? {
            Some(drop) => {
                if let Some(filename) = drop.audio.filename() {
                    storage.remove(filename)?;
                }
                info!("Removed drop {}", id);
            }
            None => bail!("Drop {} not found", id),
        },
        Command::Sync => match handle.sync(&cloud).await? {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => warn!("Cloud is disabled in config, nothing to sync"),
        },
        Command::Push => {
            let drops = handle.snapshot().await?;
            let pushed = cloud.push_all(&drops).await;
            if pushed < drops.len() && cloud.is_enabled() {
                bail!("Pushed only {} of {} drops", pushed, drops.len());
            }
        }
    }

    // Closing the last handle lets the store task flush and exit
    drop(handle);
    store_task.await.context("Drop store task panicked")?;

    Ok(())
}

async fn connect_cloud(cfg: &Config, storage: AudioStorage) -> CloudMirror {
    if !cfg.cloud.enabled {
        return CloudMirror::disabled(storage);
    }

    match NatsRemoteSource::connect(
        &cfg.cloud.nats_url,
        &cfg.cloud.subject_prefix,
        cfg.cloud.request_timeout(),
    )
    .await
    {
        Ok(source) => CloudMirror::new(Arc::new(source), storage),
        Err(e) => {
            warn!("Cloud unavailable, continuing local-only: {:#}", e);
            CloudMirror::disabled(storage)
        }
    }
}

async fn serve(cfg: &Config, handle: StoreHandle, cloud: CloudMirror) -> Result<()> {
    let background_sync = if cloud.is_enabled() && cfg.sync.interval_secs > 0 {
        let handle = handle.clone();
        let cloud = cloud.clone();
        let period = Duration::from_secs(cfg.sync.interval_secs);

        info!("Background sync every {}s", cfg.sync.interval_secs);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                // Failures are logged by sync and retried on the next tick
                let _ = handle.sync(&cloud).await;
            }
        }))
    } else {
        None
    };

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let app = create_router(AppState::new(handle, cloud));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    if let Some(task) = background_sync {
        task.abort();
    }

    Ok(())
}

async fn import(
    handle: &StoreHandle,
    cloud: &CloudMirror,
    file: &Path,
    coordinate: Coordinate,
    duration: Option<f64>,
    inline: bool,
) -> Result<AudioDrop> {
    if !coordinate.is_valid() {
        bail!("Invalid coordinate: {}, {}", coordinate.latitude, coordinate.longitude);
    }

    let duration_sec = match duration {
        Some(duration) => duration,
        None => probe_duration(file)?,
    };

    let id = Uuid::new_v4();
    let created_at = Utc::now();

    let audio = if inline {
        let bytes =
            std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        AudioRef::inline(bytes)
    } else {
        let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("wav");
        let filename = drop_filename(id, created_at, extension);
        if cloud.storage().import_file(file, &filename)? == Materialized::AlreadyPresent {
            bail!("Audio file {} already exists, not importing over it", filename);
        }
        AudioRef::file(filename)
    };

    let drop = AudioDrop::with_id(id, created_at, coordinate, duration_sec, audio);
    let added = handle.add(drop.clone()).await;
    if !matches!(added, Ok(true)) {
        if let Some(filename) = drop.audio.filename() {
            cloud.storage().remove(filename)?;
        }
    }
    if !added? {
        bail!("Drop {} already exists", drop.id);
    }

    if let Err(e) = cloud.save(&drop).await {
        warn!("Drop {} stored locally but not mirrored: {}", drop.id, e);
    }

    info!(
        "Imported {} as drop {} ({:.1}s)",
        file.display(),
        drop.id,
        drop.duration_sec
    );

    Ok(drop)
}

fn print_drops(drops: &[AudioDrop]) {
    for drop in drops {
        let audio = match &drop.audio {
            AudioRef::File { filename } => filename.clone(),
            AudioRef::Inline { data } => format!("<inline, {} bytes>", data.len()),
        };
        println!(
            "{}  {}  {:>9.5},{:>10.5}  {:>5.1}s  {}",
            drop.id,
            drop.created_at.format("%Y-%m-%d %H:%M:%S"),
            drop.coordinate.latitude,
            drop.coordinate.longitude,
            drop.duration_sec,
            audio
        );
    }
}
