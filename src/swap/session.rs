//! Swap session record and its lifecycle

use super::allowance::AllowanceDecision;
use crate::aggregator::{FinalityOutcome, SwapQuote};
use crate::chain::{Token, TransactionOutcome};
use crate::error::{SwapError, SwapResult};

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Session lifecycle. Moves strictly forward:
/// Created -> Quoted -> Approved -> Submitted -> Settled,
/// with Stuck and Failed as the other terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Quoted,
    /// Allowance reconciled (or not required)
    Approved,
    /// Swap included on the source chain
    Submitted,
    Settled,
    /// Source leg done, destination leg unconfirmed
    Stuck,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Quoted => "quoted",
            SessionState::Approved => "approved",
            SessionState::Submitted => "submitted",
            SessionState::Settled => "settled",
            SessionState::Stuck => "stuck",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Settled | SessionState::Stuck | SessionState::Failed
        )
    }

    fn can_advance_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Quoted)
                | (Quoted, Approved)
                | (Approved, Submitted)
                | (Submitted, Settled)
                | (Submitted, Stuck)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one swap attempt
#[derive(Debug, Clone, Serialize)]
pub struct SwapSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    pub source_token: Token,
    pub destination_token: Token,
    pub amount_in: String,
    pub amount_in_raw: U256,
    pub owner: Address,
    pub recipient: Address,
    pub quote: Option<SwapQuote>,
    pub allowance: Option<AllowanceDecision>,
    pub swap_tx: Option<TransactionOutcome>,
    pub finality: Option<FinalityOutcome>,
    pub failure: Option<String>,
}

impl SwapSession {
    pub fn new(
        source_token: Token,
        destination_token: Token,
        amount_in: String,
        amount_in_raw: U256,
        owner: Address,
        recipient: Address,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: SessionState::Created,
            source_token,
            destination_token,
            amount_in,
            amount_in_raw,
            owner,
            recipient,
            quote: None,
            allowance: None,
            swap_tx: None,
            finality: None,
            failure: None,
        }
    }

    fn advance(&mut self, next: SessionState) -> SwapResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(SwapError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn record_quote(&mut self, quote: SwapQuote) -> SwapResult<()> {
        self.advance(SessionState::Quoted)?;
        self.quote = Some(quote);
        Ok(())
    }

    pub fn record_allowance(&mut self, decision: AllowanceDecision) -> SwapResult<()> {
        self.advance(SessionState::Approved)?;
        self.allowance = Some(decision);
        Ok(())
    }

    pub fn record_submission(&mut self, outcome: TransactionOutcome) -> SwapResult<()> {
        self.advance(SessionState::Submitted)?;
        self.swap_tx = Some(outcome);
        Ok(())
    }

    /// Settled on success, Stuck otherwise
    pub fn record_finality(&mut self, outcome: FinalityOutcome) -> SwapResult<()> {
        let next = if outcome.is_success() {
            SessionState::Settled
        } else {
            SessionState::Stuck
        };
        self.advance(next)?;
        self.finality = Some(outcome);
        Ok(())
    }

    /// Mark the session as ended by `error`. A failure after the swap was
    /// submitted leaves funds in flight, so that session is Stuck rather than
    /// Failed when the error calls for manual follow-up. Once terminal only
    /// a missing failure message is filled in.
    pub fn fail(&mut self, error: &SwapError) {
        if self.state.is_terminal() {
            if self.state != SessionState::Settled && self.failure.is_none() {
                self.failure = Some(error.to_string());
            }
            return;
        }
        self.state = if self.state == SessionState::Submitted && error.requires_manual_followup() {
            SessionState::Stuck
        } else {
            SessionState::Failed
        };
        self.failure = Some(error.to_string());
    }
}
