//! Transaction submission module with nonce tracking and static gas parameters

pub mod gas;
mod nonce;
mod sender;

pub use nonce::NonceManager;
pub use sender::submit_and_confirm;
