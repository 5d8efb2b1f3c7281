//! Swap module - one cross-chain swap session from quote to settlement
//!
//! This module provides:
//! - Allowance reconciliation for ERC-20 source tokens
//! - The session record and its forward-only lifecycle
//! - The orchestrator that runs the stages in order and reports balances

pub mod allowance;
pub mod orchestrator;
pub mod session;

pub use orchestrator::SwapOrchestrator;
