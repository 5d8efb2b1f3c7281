//! Nonce tracking for sequential submission from the session wallet
//!
//! The wallet is owned by one session, so a single local counter per chain is
//! enough. It is seeded from the node's pending transaction count on first use.

use tokio::sync::Mutex;
use tracing::debug;

/// Hands out nonces for one chain, strictly in order
pub struct NonceManager {
    chain_id: u64,
    /// Next nonce to use, `None` until seeded
    current: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            current: Mutex::new(None),
        }
    }

    /// Allocate the next nonce, seeding from `fetch` when nothing is cached
    pub async fn next<F, Fut, E>(&self, fetch: F) -> Result<u64, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<u64, E>>,
    {
        let mut current = self.current.lock().await;
        let nonce = match *current {
            Some(n) => n,
            None => fetch().await?,
        };
        *current = Some(nonce + 1);

        debug!("Allocated nonce {} for chain {}", nonce, self.chain_id);
        Ok(nonce)
    }

    /// Release a nonce whose transaction never reached the node
    pub async fn release(&self, nonce: u64) {
        let mut current = self.current.lock().await;
        // Only the latest allocation can be handed out again
        if *current == Some(nonce + 1) {
            *current = Some(nonce);
        } else {
            // Unknown state, re-seed from the node next time
            *current = None;
        }
        debug!("Released nonce {} for chain {}", nonce, self.chain_id);
    }

    /// Drop the cached nonce after an ambiguous submission (e.g. send timeout)
    pub async fn reset(&self) {
        *self.current.lock().await = None;
        debug!("Nonce cache reset for chain {}", self.chain_id);
    }
}
