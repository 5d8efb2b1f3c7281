//! Symbiosis Swapper - single-wallet cross-chain swap settlement
//!
//! Requests a route from the Symbiosis aggregator, approves the source token
//! when needed, submits the swap on the source chain and polls the aggregator
//! until the destination leg settles.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod aggregator;
mod chain;
mod config;
mod error;
mod metrics;
mod swap;
mod tx;
mod units;

use aggregator::AggregatorClient;
use chain::EvmChainClient;
use config::Settings;
use swap::SwapOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Symbiosis Swapper v{}", env!("CARGO_PKG_VERSION"));

    // Everything is validated before any network call
    let session = Settings::load()?.into_session()?;
    info!(
        "Loaded configuration: {} {} on {} -> {} on {}, wallet {:?}",
        session.amount_in,
        session.source_token.symbol,
        session.source_chain.name,
        session.destination_token.symbol,
        session.destination_chain.name,
        session.wallet_address()
    );

    let source_chain = EvmChainClient::new(session.source_chain.clone(), session.wallet.clone())?;
    let destination_chain =
        EvmChainClient::new(session.destination_chain.clone(), session.wallet.clone())?;
    for client in [&source_chain, &destination_chain] {
        if !client.health_check().await {
            warn!("Chain {} RPC health check failed", client.config().name);
        }
    }

    let aggregator = Arc::new(AggregatorClient::new(&session.aggregator)?);
    info!("Aggregator: {}", aggregator.base_url());

    let cancel = CancellationToken::new();
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling swap session");
            cancel.cancel();
        }
    });

    let textfile = session.metrics.textfile_path.clone();
    let orchestrator = SwapOrchestrator::new(
        session,
        Arc::new(source_chain),
        Arc::new(destination_chain),
        aggregator.clone(),
        aggregator,
        cancel,
    );
    let result = orchestrator.run().await;
    signal_handle.abort();

    if let Some(path) = textfile {
        if let Err(e) = metrics::write_textfile(&path) {
            error!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    match result {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report).context("serializing swap report")?;
            println!("{}", json);
            info!("Symbiosis Swapper finished");
            Ok(())
        }
        Err(e) => {
            if let Some(hash) = e.tx_hash() {
                error!("Inspect transaction {:?} before retrying", hash);
            }
            Err(e.into())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,symbiosis_swapper=debug,hyper=warn,reqwest=warn")
    });

    let json = std::env::var("SWAPPER_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
