//! End-to-end swap session: quote, approve, submit, wait for settlement

use super::allowance::{AllowanceDecision, AllowanceManager};
use super::session::{SessionState, SwapSession};
use crate::aggregator::{
    FinalityOutcome, FinalityPoller, PollSettings, QuoteRequest, QuoteSource, StatusSource,
    SwapQuote,
};
use crate::chain::{ChainClient, Token};
use crate::config::SessionConfig;
use crate::error::{ProtocolError, SwapError, SwapResult};
use crate::metrics;
use crate::tx;
use crate::units;

use ethers::types::{Address, I256, U256};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wallet balances around a session, `None` where the read failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub source: Option<U256>,
    pub destination: Option<U256>,
}

/// Final record of a completed session
#[derive(Debug, Clone, Serialize)]
pub struct SwapReport {
    pub session: SwapSession,
    pub balances_before: BalanceSnapshot,
    pub balances_after: BalanceSnapshot,
}

impl SwapReport {
    /// Signed readable change of the source-token balance
    pub fn source_delta(&self) -> Option<String> {
        delta(
            self.balances_before.source,
            self.balances_after.source,
            &self.session.source_token,
        )
    }

    /// Signed readable change of the destination-token balance
    pub fn destination_delta(&self) -> Option<String> {
        delta(
            self.balances_before.destination,
            self.balances_after.destination,
            &self.session.destination_token,
        )
    }

    /// Raw (smallest unit) changes of the source and destination balances
    pub fn raw_deltas(&self) -> (Option<I256>, Option<I256>) {
        let raw = |before: Option<U256>, after: Option<U256>| Some(units::raw_delta(before?, after?));
        (
            raw(self.balances_before.source, self.balances_after.source),
            raw(self.balances_before.destination, self.balances_after.destination),
        )
    }
}

fn delta(before: Option<U256>, after: Option<U256>, token: &Token) -> Option<String> {
    Some(units::readable_delta(before?, after?, token.decimals))
}

/// Runs one swap session against a source and a destination chain
pub struct SwapOrchestrator {
    config: SessionConfig,
    source_chain: Arc<dyn ChainClient>,
    destination_chain: Arc<dyn ChainClient>,
    quotes: Arc<dyn QuoteSource>,
    status: Arc<dyn StatusSource>,
    cancel: CancellationToken,
}

impl SwapOrchestrator {
    pub fn new(
        config: SessionConfig,
        source_chain: Arc<dyn ChainClient>,
        destination_chain: Arc<dyn ChainClient>,
        quotes: Arc<dyn QuoteSource>,
        status: Arc<dyn StatusSource>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            source_chain,
            destination_chain,
            quotes,
            status,
            cancel,
        }
    }

    /// Execute the session. Every stage runs at most once; the first error
    /// ends the session and is returned after the summary is logged.
    pub async fn run(&self) -> SwapResult<SwapReport> {
        let mut session = SwapSession::new(
            self.config.source_token,
            self.config.destination_token,
            self.config.amount_in.clone(),
            self.config.amount_in_raw,
            self.config.wallet_address(),
            self.config.recipient,
        );

        info!(
            "Swap session {} started: {} {} -> {} for {:?}",
            session.id,
            session.amount_in,
            session.source_token,
            session.destination_token,
            session.recipient
        );

        let balances_before = self.snapshot().await;
        self.log_balances("before", &balances_before);

        if let Err(e) = self.execute(&mut session).await {
            session.fail(&e);
            metrics::record_session(session.state.as_str());
            self.log_failure(&session, &e);
            return Err(e);
        }

        let balances_after = self.snapshot().await;
        self.log_balances("after", &balances_after);

        metrics::record_session(session.state.as_str());
        let report = SwapReport {
            session,
            balances_before,
            balances_after,
        };
        let (source_raw, destination_raw) = report.raw_deltas();
        info!(
            "Swap session {} settled: source {} ({:?} raw), destination {} ({:?} raw)",
            report.session.id,
            report.source_delta().unwrap_or_else(|| "unknown".to_string()),
            source_raw,
            report.destination_delta().unwrap_or_else(|| "unknown".to_string()),
            destination_raw,
        );
        Ok(report)
    }

    async fn execute(&self, session: &mut SwapSession) -> SwapResult<()> {
        let quote = self.quote().await?;
        session.record_quote(quote.clone())?;

        let decision = self.reconcile_allowance(&quote).await?;
        session.record_allowance(decision)?;

        self.ensure_not_cancelled("submitting the swap")?;
        let started = Instant::now();
        let outcome = tx::submit_and_confirm(self.source_chain.as_ref(), &quote.tx_request()).await?;
        let tx_hash = outcome.tx_hash;
        let chain_id = outcome.chain_id;
        session.record_submission(outcome)?;
        info!(
            "Swap {:?} included on chain {} after {:?}",
            tx_hash,
            chain_id,
            started.elapsed()
        );

        // from here on the swap is on chain, so every error carries its hash
        let outcome = self
            .wait_for_settlement(chain_id, tx_hash, &quote)
            .await
            .map_err(|source| match source {
                SwapError::Cancelled { .. } => source,
                source => SwapError::SettlementUntracked {
                    chain_id,
                    tx_hash,
                    source: Box::new(source),
                },
            })?;
        session.record_finality(outcome.clone())?;
        if !outcome.is_success() {
            return Err(SwapError::FinalityTimeout {
                chain_id,
                tx_hash,
                outcome,
            });
        }
        Ok(())
    }

    async fn quote(&self) -> SwapResult<SwapQuote> {
        let request = QuoteRequest {
            token_in: self.config.source_token,
            amount_in: self.config.amount_in.clone(),
            token_out: self.config.destination_token,
            from: self.config.wallet_address(),
            to: self.config.recipient,
            slippage_bps: self.config.slippage_bps,
        };

        let started = Instant::now();
        let quote = self
            .cancellable("requesting a quote", self.quotes.request_swap(&request))
            .await?;
        metrics::record_stage_latency("quote", started.elapsed());

        info!(
            "Quote: send {} {} to {:?}, receive at least {} {}{}",
            self.config.amount_in,
            self.config.source_token.symbol,
            quote.tx.to,
            units::to_readable(quote.min_amount_out, self.config.destination_token.decimals),
            self.config.destination_token.symbol,
            quote
                .estimated_time
                .map(|t| format!(", estimated {}s", t))
                .unwrap_or_default()
        );
        Ok(quote)
    }

    async fn reconcile_allowance(&self, quote: &SwapQuote) -> SwapResult<AllowanceDecision> {
        let token = &self.config.source_token;
        if token.is_native() {
            info!("{} is native, no approval needed", token);
            return Ok(AllowanceDecision::NotRequired);
        }

        let spender = quote
            .approve_to
            .ok_or(ProtocolError::MissingField("approveTo"))?;

        self.ensure_not_cancelled("reconciling the allowance")?;
        let started = Instant::now();
        let decision = AllowanceManager::new(self.source_chain.as_ref(), self.config.allowance_fallback)
            .ensure_allowance(
                token,
                self.config.wallet_address(),
                spender,
                &self.config.amount_in,
            )
            .await?;
        metrics::record_stage_latency("allowance", started.elapsed());
        Ok(decision)
    }

    async fn wait_for_settlement(
        &self,
        chain_id: u64,
        tx_hash: ethers::types::H256,
        quote: &SwapQuote,
    ) -> SwapResult<FinalityOutcome> {
        let aggregator = &self.config.aggregator;
        let deadline = tokio::time::Instant::now()
            + aggregator.poll_budget()
            + Duration::from_secs(aggregator.request_timeout_secs);

        info!(
            "Waiting for cross-chain settlement of {:?} (up to {} polls every {:?}{})",
            tx_hash,
            aggregator.max_polls,
            aggregator.poll_interval(),
            quote
                .estimated_time
                .map(|t| format!(", aggregator estimate {}s", t))
                .unwrap_or_default()
        );

        let started = Instant::now();
        let poller = FinalityPoller::new(PollSettings::from(aggregator), self.cancel.clone());
        let outcome = poller
            .wait_for_completion(self.status.as_ref(), chain_id, tx_hash, Some(deadline))
            .await?;
        metrics::record_stage_latency("finality", started.elapsed());
        Ok(outcome)
    }

    async fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            source: self
                .read_balance(
                    self.source_chain.as_ref(),
                    &self.config.source_token,
                    self.config.wallet_address(),
                )
                .await,
            destination: self
                .read_balance(
                    self.destination_chain.as_ref(),
                    &self.config.destination_token,
                    self.config.recipient,
                )
                .await,
        }
    }

    async fn read_balance(
        &self,
        chain: &dyn ChainClient,
        token: &Token,
        owner: Address,
    ) -> Option<U256> {
        match chain.balance(token.address, owner).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Could not read {} balance of {:?}: {}", token, owner, e);
                None
            }
        }
    }

    fn log_balances(&self, label: &str, snapshot: &BalanceSnapshot) {
        let show = |balance: Option<U256>, token: &Token| {
            balance
                .map(|b| format!("{} {}", units::to_readable(b, token.decimals), token.symbol))
                .unwrap_or_else(|| format!("unknown {}", token.symbol))
        };
        info!(
            "Balances {}: {} on {}, {} on {}",
            label,
            show(snapshot.source, &self.config.source_token),
            self.config.source_chain.name,
            show(snapshot.destination, &self.config.destination_token),
            self.config.destination_chain.name,
        );
    }

    fn log_failure(&self, session: &SwapSession, e: &SwapError) {
        error!("Swap session {} ended {}: {}", session.id, session.state, e);
        if let Some(tx) = &session.swap_tx {
            error!(
                "Swap transaction {:?} was included on chain {}",
                tx.tx_hash, tx.chain_id
            );
        }
        if session.state == SessionState::Stuck {
            warn!(
                "Funds may be in transit; track {:?} on the aggregator before retrying",
                e.tx_hash().or(session.swap_tx.as_ref().map(|t| t.tx_hash))
            );
        }
    }

    fn ensure_not_cancelled(&self, operation: &str) -> SwapResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SwapError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    async fn cancellable<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = SwapResult<T>>,
    ) -> SwapResult<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SwapError::Cancelled {
                operation: operation.to_string(),
            }),
            result = fut => result,
        }
    }
}
