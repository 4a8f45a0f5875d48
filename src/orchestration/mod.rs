//! Withdrawal orchestration: state machine, bounded retries and compensation.

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod state;

pub use error::WithdrawError;
pub use orchestrator::{Collaborators, WithdrawReport, WithdrawalOrchestrator, OUT_OF_STOCK_NOTE};
pub use retry::{with_retries, RetryPolicy, Transient};
pub use state::{StateTrail, WithdrawalState};
