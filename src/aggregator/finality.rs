//! Cross-chain finality polling
//!
//! The destination leg of a swap is relayed off-chain and settles minutes
//! after the source transaction, so completion is learned by polling the
//! aggregator at a fixed interval. Worst-case wait is roughly
//! `max_polls * interval`.

use super::types::{DestinationTx, FinalityStatus, TxStatus};
use crate::config::AggregatorConfig;
use crate::error::{SwapError, SwapResult};
use crate::metrics;

use async_trait::async_trait;
use ethers::types::H256;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One answer of the status endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// HTTP 404: the aggregator has not indexed the transaction yet
    NotIndexed,
    Indexed(TxStatus),
}

/// Source of cross-chain status reports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn tx_status(&self, chain_id: u64, tx_hash: H256) -> SwapResult<StatusReport>;
}

/// How polling ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalityOutcome {
    Confirmed { destination_tx: Option<DestinationTx> },
    Stuck,
    /// Only produced when reverted is configured as terminal
    Reverted,
    Exhausted { attempts: u32 },
    DeadlinePassed { attempts: u32 },
}

impl FinalityOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FinalityOutcome::Confirmed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FinalityOutcome::Confirmed { .. } => "confirmed",
            FinalityOutcome::Stuck => "stuck",
            FinalityOutcome::Reverted => "reverted",
            FinalityOutcome::Exhausted { .. } => "exhausted",
            FinalityOutcome::DeadlinePassed { .. } => "deadline_passed",
        }
    }
}

impl fmt::Display for FinalityOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalityOutcome::Confirmed { destination_tx: Some(tx) } => {
                write!(f, "confirmed (destination tx {} on chain {})", tx.hash, tx.chain_id)
            }
            FinalityOutcome::Confirmed { destination_tx: None } => f.write_str("confirmed"),
            FinalityOutcome::Stuck => f.write_str("stuck"),
            FinalityOutcome::Reverted => f.write_str("reverted"),
            FinalityOutcome::Exhausted { attempts } => {
                write!(f, "no terminal status after {} polls", attempts)
            }
            FinalityOutcome::DeadlinePassed { attempts } => {
                write!(f, "deadline passed after {} polls", attempts)
            }
        }
    }
}

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_polls: u32,
    pub interval: Duration,
    pub reverted_is_terminal: bool,
}

impl From<&AggregatorConfig> for PollSettings {
    fn from(config: &AggregatorConfig) -> Self {
        Self {
            max_polls: config.max_polls,
            interval: config.poll_interval(),
            reverted_is_terminal: config.treat_reverted_as_terminal,
        }
    }
}

/// Bounded fixed-interval poller with cooperative cancellation
pub struct FinalityPoller {
    settings: PollSettings,
    cancel: CancellationToken,
}

impl FinalityPoller {
    pub fn new(settings: PollSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    /// Poll until the swap is confirmed, found stuck, the poll budget runs
    /// out or `deadline` would be crossed by the next wait.
    ///
    /// Aggregator errors other than 404 end polling immediately.
    pub async fn wait_for_completion(
        &self,
        source: &dyn StatusSource,
        chain_id: u64,
        tx_hash: H256,
        deadline: Option<Instant>,
    ) -> SwapResult<FinalityOutcome> {
        let interval = self.settings.interval;
        let mut attempts = 0u32;

        loop {
            let report = tokio::select! {
                _ = self.cancel.cancelled() => return Err(cancelled()),
                report = source.tx_status(chain_id, tx_hash) => report?,
            };
            attempts += 1;

            match report {
                StatusReport::NotIndexed => {
                    metrics::record_finality_poll(chain_id, "not_indexed");
                    info!(
                        "Swap {:?} not yet published by the aggregator (poll {}/{}), waiting {}s",
                        tx_hash,
                        attempts,
                        self.settings.max_polls,
                        interval.as_secs()
                    );
                }
                StatusReport::Indexed(status) => {
                    metrics::record_finality_poll(chain_id, status.status.as_str());
                    match status.status {
                        FinalityStatus::Success => {
                            let outcome = FinalityOutcome::Confirmed {
                                destination_tx: status.destination_tx,
                            };
                            info!("Swap {:?}: {}, cross-chain swap complete", tx_hash, outcome);
                            return Ok(outcome);
                        }
                        FinalityStatus::Stuck => {
                            warn!("Swap {:?} reported stuck: {}", tx_hash, status.text);
                            return Ok(FinalityOutcome::Stuck);
                        }
                        FinalityStatus::Reverted if self.settings.reverted_is_terminal => {
                            warn!("Swap {:?} reported reverted: {}", tx_hash, status.text);
                            return Ok(FinalityOutcome::Reverted);
                        }
                        FinalityStatus::Reverted => {
                            warn!(
                                "Swap {:?} reported reverted ({}), still polling (poll {}/{})",
                                tx_hash, status.text, attempts, self.settings.max_polls
                            );
                        }
                        FinalityStatus::NotFound | FinalityStatus::Pending => {
                            info!(
                                "Swap {:?} destination leg {} (poll {}/{}), waiting {}s",
                                tx_hash,
                                status.status.as_str(),
                                attempts,
                                self.settings.max_polls,
                                interval.as_secs()
                            );
                        }
                    }
                }
            }

            if attempts >= self.settings.max_polls {
                warn!("Swap {:?} not settled after {} polls", tx_hash, attempts);
                return Ok(FinalityOutcome::Exhausted { attempts });
            }

            if let Some(deadline) = deadline {
                if Instant::now() + interval > deadline {
                    warn!("Swap {:?} polling deadline reached after {} polls", tx_hash, attempts);
                    return Ok(FinalityOutcome::DeadlinePassed { attempts });
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(cancelled()),
                _ = sleep(interval) => {}
            }
        }
    }
}

fn cancelled() -> SwapError {
    SwapError::Cancelled {
        operation: "waiting for cross-chain finality".to_string(),
    }
}
