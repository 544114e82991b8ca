//! Transio CLI - transient store administration
//!
//! Operates a transient store kept on local disk: entries live in a redb
//! key/value store (`<data_dir>/kv.redb`), blob bytes in a content-addressed
//! tree per provider namespace (`<data_dir>/blobs/<namespace>`).

mod config;
mod values;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transio_blob::{BlobProvider, FileBlobProvider};
use transio_common::{Blob, ParameterValue, TransientStoreConfig};
use transio_kv::{KeyValueStore, RedbKeyValueStore};
use transio_store::{ProviderRegistry, TransientStore};

#[derive(Parser, Debug)]
#[command(name = "transio-cli")]
#[command(about = "Transio transient store CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/transio/transio.toml")]
    config: PathBuf,

    /// Data directory (overrides storage.data_dir)
    #[arg(long, env = "TRANSIO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store name (overrides store.name)
    #[arg(short, long)]
    store: Option<String>,

    /// Log level (overrides logging.level)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a parameter
    PutParam {
        entry: String,
        name: String,
        value: String,
        /// Parse the value as JSON instead of storing it as text
        #[arg(long)]
        json: bool,
    },
    /// Print a parameter
    GetParam { entry: String, name: String },
    /// Print every parameter of an entry as JSON
    Params { entry: String },
    /// Replace the blobs of an entry with the given files
    PutBlobs {
        entry: String,
        files: Vec<PathBuf>,
        /// MIME type of every file
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// List the blobs of an entry, optionally saving them
    GetBlobs {
        entry: String,
        /// Directory to write the blobs to
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show whether an entry exists and is completed
    Status { entry: String },
    /// Flag an entry as completed
    Complete {
        entry: String,
        /// Clear the flag instead
        #[arg(long)]
        unset: bool,
    },
    /// Release an entry
    Release { entry: String },
    /// Remove an entry
    Remove { entry: String },
    /// List the live entries
    Keys,
    /// Show the storage size of the store, or of one entry
    Size { entry: Option<String> },
    /// Recompute the storage size from the live entries
    Recompute,
    /// Run blob garbage collection
    Gc {
        /// Keep running, once per interval in seconds (0 uses gc.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Remove every entry of the store
    RemoveAll {
        /// Confirm
        #[arg(long)]
        yes: bool,
    },
}

/// Open the store described by `store_config` under `data_dir`
fn open_store(
    store_config: &TransientStoreConfig,
    data_dir: &Path,
) -> Result<(TransientStore, Arc<RedbKeyValueStore>)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let kv = Arc::new(RedbKeyValueStore::open(data_dir.join("kv.redb"))?);

    let registry = ProviderRegistry::new();
    registry.register_key_value_store(&store_config.key_value_store, kv.clone());
    let blobs_root = data_dir.join("blobs");
    registry.register_blob_factory(
        &store_config.default_blob_provider,
        Box::new(move |id: &str| -> transio_common::Result<Arc<dyn BlobProvider>> {
            Ok(Arc::new(FileBlobProvider::open(id, blobs_root.join(id))?) as Arc<dyn BlobProvider>)
        }),
    );

    let store = TransientStore::from_registry(store_config.clone(), &registry)?;
    Ok((store, kv))
}

fn print_blobs(blobs: &[Blob], out: Option<&Path>) -> Result<()> {
    if let Some(out) = out {
        std::fs::create_dir_all(out)?;
    }
    for (i, blob) in blobs.iter().enumerate() {
        let name = blob
            .filename
            .as_deref()
            .and_then(|f| Path::new(f).file_name())
            .map_or_else(|| format!("blob-{i}"), |f| f.to_string_lossy().into_owned());
        println!(
            "{i}\t{name}\t{} bytes\t{}\t{}",
            blob.length(),
            blob.mime_type.as_deref().unwrap_or("-"),
            blob.digest.as_deref().unwrap_or("-")
        );
        if let Some(out) = out {
            std::fs::write(out.join(&name), &blob.data)?;
        }
    }
    Ok(())
}

/// Run `do_gc` (plus key/value expiry) every `period` until Ctrl-C
async fn gc_loop(store: TransientStore, kv: Arc<RedbKeyValueStore>, period: Duration) -> Result<()> {
    info!("Running GC on store {} every {:?}", store.name(), period);
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let store = store.clone();
                let kv = kv.clone();
                let pass = tokio::task::spawn_blocking(move || -> transio_common::Result<_> {
                    let expired = kv.expire_once()?;
                    let status = store.do_gc()?;
                    Ok((expired, status))
                })
                .await?;
                match pass {
                    Ok((expired, Some(status))) => {
                        info!("GC pass: {} (expired {} keys)", status, expired);
                    }
                    Ok((_, None)) => info!("GC pass skipped, another one is running"),
                    Err(e) => error!("GC pass failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let mut config = Config::load(&args.config)?;

    // Merge CLI args with config file (CLI takes precedence)
    let data_dir = args.data_dir.unwrap_or(config.storage.data_dir.clone());
    if let Some(name) = args.store {
        config.store.name = name;
    }
    let log_level = args.log_level.unwrap_or(config.logging.level.clone());
    let json_logs = config.logging.format == "json";

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let (store, kv) = open_store(&config.store, &data_dir)?;

    match args.command {
        Commands::PutParam {
            entry,
            name,
            value,
            json,
        } => {
            let value = if json {
                values::from_json(serde_json::from_str(&value).context("parsing JSON value")?)?
            } else {
                ParameterValue::Text(value)
            };
            store.put_parameter(&entry, &name, value)?;
        }
        Commands::GetParam { entry, name } => match store.get_parameter(&entry, &name)? {
            Some(ParameterValue::Text(text)) => println!("{text}"),
            Some(value) => println!("{}", values::to_json(&value)),
            None => anyhow::bail!("no parameter {name} on {entry}"),
        },
        Commands::Params { entry } => {
            let Some(params) = store.get_parameters(&entry)? else {
                anyhow::bail!("no entry {entry}");
            };
            let object: serde_json::Map<String, serde_json::Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), values::to_json(v)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        Commands::PutBlobs {
            entry,
            files,
            mime_type,
        } => {
            let mut blobs = Vec::with_capacity(files.len());
            for file in &files {
                let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
                let mut blob = Blob::new(data);
                if let Some(name) = file.file_name() {
                    blob = blob.with_filename(name.to_string_lossy());
                }
                if let Some(mime_type) = &mime_type {
                    blob = blob.with_mime_type(mime_type.as_str());
                }
                blobs.push(blob);
            }
            store.put_blobs(&entry, &blobs)?;
            println!("Stored {} blobs on {}", blobs.len(), entry);
        }
        Commands::GetBlobs { entry, out } => {
            let Some(blobs) = store.get_blobs(&entry)? else {
                anyhow::bail!("no entry {entry}");
            };
            print_blobs(&blobs, out.as_deref())?;
        }
        Commands::Status { entry } => {
            println!("exists:    {}", store.exists(&entry)?);
            println!("completed: {}", store.is_completed(&entry)?);
            if let Some(size) = store.get_size(&entry)? {
                println!("size:      {size} bytes");
            }
        }
        Commands::Complete { entry, unset } => store.set_completed(&entry, !unset)?,
        Commands::Release { entry } => store.release(&entry)?,
        Commands::Remove { entry } => store.remove(&entry)?,
        Commands::Keys => {
            for key in store.keys()? {
                println!("{key}");
            }
        }
        Commands::Size { entry: None } => println!("{} bytes", store.storage_size()?),
        Commands::Size { entry: Some(entry) } => {
            println!("{} bytes", store.get_size(&entry)?.unwrap_or(0));
        }
        Commands::Recompute => println!("{} bytes", store.recompute_storage_size()?),
        Commands::Gc { interval: None } => {
            let expired = kv.expire_once()?;
            match store.do_gc()? {
                Some(status) => println!("{status} (expired {expired} keys)"),
                None => warn!("GC already in progress, skipped"),
            }
        }
        Commands::Gc {
            interval: Some(secs),
        } => {
            let period = config.gc.period(secs)?;
            gc_loop(store, kv, period).await?;
        }
        Commands::RemoveAll { yes } => {
            if !yes {
                anyhow::bail!("refusing to remove every entry of {} without --yes", store.name());
            }
            store.remove_all()?;
        }
    }

    Ok(())
}
