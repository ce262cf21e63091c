//! degens-mm: automated market maker for the Degens exchange.
//!
//! Usage:
//!   degens-mm -c <FILE> [--log-level <LEVEL>]
//!
//! Secrets can come from the environment (or a `.env` file) instead of the
//! config file: `DEGENS_MM_PRIVATE_KEY`, `DEGENS_MM_REFLECTOR_API_KEY` and
//! `DEGENS_MM_ORDERBOOK_ENDPOINT`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use degens_mm::client::{AccountTopics, ClientEvent, DegensClient};
use degens_mm::config::MmConfig;
use degens_mm::engine::MarketMaker;
use degens_mm::feed::{FeedConfig, ReflectedPrices};
use degens_mm::orders::{
    LocalOrderSigner, OrderLifecycleManager, OrderSettings, OrderSigner, SqliteOrderStore,
};
use degens_mm::ws::WsConfig;

#[derive(Parser, Debug)]
#[command(name = "degens-mm")]
#[command(about = "Automated market maker for the Degens betting exchange")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: PathBuf,

    /// Log level or filter directive (overrides config; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let mut config = MmConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    config.apply_env_overrides();
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to set global tracing subscriber: {}", e))?;

    config.validate().context("Configuration validation failed")?;

    let signer = Arc::new(
        LocalOrderSigner::from_private_key(&config.private_key).context("Invalid private key")?,
    );
    let maker = signer.address();
    info!(address = %maker, "Using address");

    let store = Arc::new(
        SqliteOrderStore::new(&config.db_path)
            .with_context(|| format!("Failed to open order database {}", config.db_path))?,
    );
    let settings = OrderSettings {
        maker: maker.clone(),
        token: config.token_addr.clone(),
        contract: config.contract_addr.clone(),
        chain_id: config.chain_id,
        poll_interval_secs: config.poll_interval_seconds as i64,
    };
    let mm = Arc::new(MarketMaker::new(
        &config,
        OrderLifecycleManager::new(store, signer, settings),
    ));

    let client = Arc::new(DegensClient::new(WsConfig {
        url: config.orderbook_endpoint.clone(),
        version: config.version_name.clone(),
        ping_interval_ms: config.ping_interval_ms,
        request_timeout_ms: config.request_timeout_ms,
        ..WsConfig::default()
    }));
    client
        .subscribe_account(
            &maker,
            AccountTopics {
                positions: true,
                order_fills: true,
            },
        )
        .context("Failed to subscribe to account")?;
    client.subscribe_events().context("Failed to subscribe to events")?;
    client.connect();
    info!(endpoint = %config.orderbook_endpoint, "Connecting to orderbook");

    let feed = Arc::new(
        ReflectedPrices::new(
            FeedConfig::new(&config.reflector_url, &config.reflector_api_key)
                .with_interval(Duration::from_millis(config.reflector_interval_ms)),
        )
        .context("Failed to build reflector client")?,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = tokio::spawn(Arc::clone(&feed).run(shutdown_rx));
    let mut feed_updates = feed.updates();

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let trigger = || {
        let mm = Arc::clone(&mm);
        let client = Arc::clone(&client);
        let feed = Arc::clone(&feed);
        tokio::spawn(async move {
            mm.trigger(&client, &feed).await;
        });
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(ClientEvent::Connected) | Some(ClientEvent::Updated(_)) => trigger(),
                Some(ClientEvent::Disconnected) => {}
                None => {
                    warn!("Client event stream ended");
                    break;
                }
            },
            changed = feed_updates.changed() => {
                if changed.is_err() {
                    warn!("Reflector poller stopped");
                    break;
                }
                trigger();
            }
            _ = ticker.tick() => trigger(),
            _ = &mut ctrl_c => {
                info!("Shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    client.shutdown().await;
    if let Err(e) = feed_task.await {
        warn!(error = %e, "Reflector task ended abnormally");
    }

    Ok(())
}
