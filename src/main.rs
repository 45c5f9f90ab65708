use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payrecon::application::multiplexer::{Delivery, DeliveryMultiplexer, spawn_worker};
use payrecon::application::reconciler::Reconciler;
use payrecon::config::ReconcilerConfig;
use payrecon::domain::callback::SourceChannel;
use payrecon::domain::ports::PendingStoreBox;
use payrecon::infrastructure::in_memory::{CollectingPresenter, InMemoryPendingStore};
use payrecon::interfaces::csv::delivery_reader::DeliveryReader;
use payrecon::interfaces::csv::outcome_writer::OutcomeWriter;
use payrecon::interfaces::csv::pending_reader::PendingReader;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Replays recorded payment-provider callbacks through the reconciler and
/// prints every presented outcome as CSV.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Recorded deliveries CSV (`channel, url`)
    input: PathBuf,

    /// Pending bookings CSV (`reference, expected_amount, booking_context`) to
    /// register before replaying.
    #[arg(long)]
    pending: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "PAYRECON_DB_PATH")]
    db_path: Option<PathBuf>,

    /// How long repeats of a reconciled reference are absorbed.
    #[arg(long, env = "PAYRECON_COOL_DOWN_MS", default_value_t = 3000)]
    cool_down_ms: u64,

    /// Divisor turning provider minor units into display currency.
    #[arg(long, env = "PAYRECON_MINOR_UNIT_FACTOR", default_value_t = 100)]
    minor_unit_factor: u32,

    /// Payment provider domain the web view may load.
    #[arg(long, env = "PAYRECON_PROVIDER_HOST")]
    provider_host: Option<String>,

    /// URL scheme the provider redirects back to.
    #[arg(long, env = "PAYRECON_CALLBACK_SCHEME")]
    callback_scheme: Option<String>,
}

impl Cli {
    fn config(&self) -> ReconcilerConfig {
        let defaults = ReconcilerConfig::default();
        ReconcilerConfig {
            cool_down: Duration::from_millis(self.cool_down_ms),
            minor_unit_factor: self.minor_unit_factor,
            provider_host: self.provider_host.clone().unwrap_or(defaults.provider_host),
            callback_scheme: self.callback_scheme.clone().unwrap_or(defaults.callback_scheme),
            fields: defaults.fields,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config();

    let store = open_store(cli.db_path.as_deref())?;

    if let Some(path) = &cli.pending {
        let file = File::open(path).into_diagnostic()?;
        for pending in PendingReader::new(file).pending() {
            match pending {
                Ok(tx) => store.insert(tx).await.into_diagnostic()?,
                Err(e) => error!(error = %e, "Error reading pending transaction"),
            }
        }
    }

    let presenter = CollectingPresenter::new();
    let reconciler = Arc::new(Reconciler::new(&config, store, Box::new(presenter.clone())));

    let (multiplexer, receiver) = DeliveryMultiplexer::new(&config);
    let worker = spawn_worker(reconciler, receiver);

    let file = File::open(&cli.input).into_diagnostic()?;
    for delivery in DeliveryReader::new(file).deliveries() {
        match delivery {
            Ok(delivery) => dispatch(&multiplexer, delivery).into_diagnostic()?,
            Err(e) => error!(error = %e, "Error reading delivery"),
        }
    }

    // Dropping the last handle lets the worker drain and stop.
    drop(multiplexer);
    let stats = worker.await.into_diagnostic()?;
    info!(
        presented = stats.presented,
        duplicates = stats.duplicates,
        malformed = stats.malformed,
        errors = stats.errors,
        "Replay finished"
    );

    let outcomes = presenter.outcomes().await;
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    writer.write_outcomes(&outcomes).into_diagnostic()?;

    Ok(())
}

fn dispatch(multiplexer: &DeliveryMultiplexer, delivery: Delivery) -> payrecon::error::Result<()> {
    match delivery.channel {
        SourceChannel::OsDeepLink => multiplexer.deep_link(&delivery.raw),
        SourceChannel::ColdStartInitialUrl => multiplexer.initial_url(Some(&delivery.raw)),
        SourceChannel::WebViewIntercept => {
            let decision = multiplexer.web_view_navigation(&delivery.raw);
            info!(url = %delivery.raw, ?decision, "Web view navigation");
            Ok(())
        }
    }
}

fn open_store(db_path: Option<&Path>) -> Result<PendingStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = payrecon::infrastructure::rocksdb::RocksDBPendingStore::open(path)
                .into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryPendingStore::new()))
        }
        None => Ok(Box::new(InMemoryPendingStore::new())),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();
}
