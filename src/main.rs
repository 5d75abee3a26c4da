//! relayfw-sim: host simulator for the firmware-update engine.
//!
//! Feeds recorded inbound envelopes through a [`FotaController`] backed by
//! a directory store, the same way the relay's main loop does after each
//! cloud poll, then prints the update status and the sealed status request
//! the relay would send next.
//!
//! ```text
//! relayfw-sim --config engine.json --store ./fota manifest.json chunk0.json chunk1.json
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use relayfw::adapters::fs_store::FsStore;
use relayfw::adapters::log_sink::LogEventSink;
use relayfw::adapters::nvs::NvsAdapter;
use relayfw::app::ports::{ConfigPort, NonceLedger};
use relayfw::config::EngineConfig;
use relayfw::fota::auth::SecureEnvelope;
use relayfw::{Error, FotaController, FotaOutcome};

#[derive(Parser)]
#[command(name = "relayfw-sim", version, about = "Replay FOTA envelopes against the update engine")]
struct Opts {
    /// Engine configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding chunk files and the assembled image
    #[arg(short, long, default_value = "fota-store")]
    store: PathBuf,

    /// Keep files left in the store instead of purging them at start-up
    #[arg(long)]
    no_purge: bool,

    /// Key/value file holding the config blob and the nonce counter
    /// [default: <store>/nvs.bin]
    #[arg(long)]
    nvs: Option<PathBuf>,

    /// Write the sealed status envelope here instead of stdout
    #[arg(long)]
    status_out: Option<PathBuf>,

    /// Inbound envelope files (JSON), processed in order
    envelopes: Vec<PathBuf>,
}

fn load_config(path: &PathBuf) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let config = load_config(&opts.config)?;
    let store = FsStore::open(&opts.store)?;

    let nvs_path = opts.nvs.clone().unwrap_or_else(|| store.root().join("nvs.bin"));
    let mut nvs = NvsAdapter::open(&nvs_path)
        .with_context(|| format!("opening {}", nvs_path.display()))?;
    info!("last issued nonce: {}", nvs.current());
    nvs.save(&config)?;
    let mut sink = LogEventSink::new();
    let mut fota = FotaController::new(nvs.load()?, store)?;
    if !opts.no_purge {
        fota.begin(&mut sink);
    }

    for path in &opts.envelopes {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading envelope {}", path.display()))?;
        let envelope: SecureEnvelope = serde_json::from_str(&text)
            .with_context(|| format!("parsing envelope {}", path.display()))?;

        match fota.handle_envelope(&envelope, &mut sink) {
            Ok(FotaOutcome::Completed) => info!("{}: update complete", path.display()),
            Ok(outcome) => info!("{}: {:?}", path.display(), outcome),
            Err(e @ Error::AwaitingReset(_)) => {
                bail!("{}: {e}", path.display());
            }
            Err(e) => warn!("{}: {e}", path.display()),
        }
    }

    println!("{}", fota.snapshot());
    if let Some(image) = fota.image() {
        println!("Image:    {}", fota.store().root().join(image.name).display());
    }

    let sealed = fota.seal_status(&mut nvs)?;
    let sealed = serde_json::to_string_pretty(&sealed)?;

    match &opts.status_out {
        Some(path) => fs::write(path, sealed)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{sealed}"),
    }
    info!(
        "poll again in {} ms (events logged: {})",
        fota.recommended_poll_interval().as_millis(),
        sink.emitted()
    );
    Ok(())
}
