//! Transaction submission with explicit inclusion-failure classification

use crate::chain::{ChainClient, TransactionOutcome, TxRequest};
use crate::error::{SwapError, SwapResult};
use crate::metrics;

use std::time::Instant;
use tracing::{error, info};

/// Submit a transaction and wait for it to be included.
///
/// An included-but-failed transaction becomes [`SwapError::ChainTxFailure`]
/// carrying its hash. Nothing is retried here: once a transaction has been
/// handed to the node its fate belongs to the operator.
pub async fn submit_and_confirm(
    chain: &dyn ChainClient,
    request: &TxRequest,
) -> SwapResult<TransactionOutcome> {
    let chain_id = chain.chain_id();
    let started = Instant::now();

    info!(
        "Submitting {} transaction on chain {} to {:?} (value {})",
        request.kind, chain_id, request.to, request.value
    );

    let outcome = match chain.send_transaction(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{} transaction on chain {} not submitted: {}", request.kind, chain_id, e);
            metrics::record_tx_failed(chain_id, request.kind);
            return Err(e);
        }
    };
    metrics::record_tx_submitted(chain_id, request.kind);
    metrics::record_stage_latency(request.kind, started.elapsed());

    if !outcome.success {
        error!(
            "{} transaction {:?} on chain {} was included with failed status",
            request.kind, outcome.tx_hash, chain_id
        );
        metrics::record_tx_failed(chain_id, request.kind);
        return Err(SwapError::ChainTxFailure {
            chain_id,
            tx_hash: outcome.tx_hash,
        });
    }

    info!(
        "{} transaction {:?} confirmed on chain {} (block {:?}, gas used {:?})",
        request.kind, outcome.tx_hash, chain_id, outcome.block_number, outcome.gas_used
    );
    Ok(outcome)
}
