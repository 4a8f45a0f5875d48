//! Withdrawal state machine.
//!
//! Terminal states: Completed, PendingApproval, RolledBack, Rejected, Escalated.

use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalState {
    /// Initial state, payload and identity not yet checked
    Validating,
    EligibilityChecked,
    /// Identity verified: try to issue the card before touching the balance
    VerifiedImmediate,
    UnverifiedDeferred,
    /// Balance debited. Must end in Completed, PendingApproval or a rollback
    Debited,
    /// Debited with an issued card, writing the Completed record
    Fulfilling,
    /// Debited without a card, writing the Pending record
    Recording,
    Completed,
    PendingApproval,
    /// Crediting the debit back
    RollingBack,
    RolledBack,
    /// Refused before any mutation
    Rejected,
    /// Rollback retries exhausted; needs an operator
    Escalated,
}

impl WithdrawalState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalState::Completed
                | WithdrawalState::PendingApproval
                | WithdrawalState::RolledBack
                | WithdrawalState::Rejected
                | WithdrawalState::Escalated
        )
    }

    /// Whether the balance is debited and not yet settled or restored.
    #[inline]
    pub fn holds_debit(&self) -> bool {
        matches!(
            self,
            WithdrawalState::Debited
                | WithdrawalState::Fulfilling
                | WithdrawalState::Recording
                | WithdrawalState::RollingBack
                | WithdrawalState::Escalated
        )
    }

    pub fn can_transition_to(&self, next: WithdrawalState) -> bool {
        use WithdrawalState::*;
        matches!(
            (self, next),
            (Validating, EligibilityChecked)
                | (Validating, Rejected)
                // replay of an already recorded attempt
                | (Validating, Completed)
                | (Validating, PendingApproval)
                | (EligibilityChecked, VerifiedImmediate)
                | (EligibilityChecked, UnverifiedDeferred)
                | (EligibilityChecked, Rejected)
                | (VerifiedImmediate, Debited)
                | (VerifiedImmediate, UnverifiedDeferred)
                | (VerifiedImmediate, Rejected)
                | (UnverifiedDeferred, Debited)
                | (UnverifiedDeferred, Rejected)
                | (Debited, Fulfilling)
                | (Debited, Recording)
                | (Fulfilling, Completed)
                | (Fulfilling, RollingBack)
                | (Recording, PendingApproval)
                | (Recording, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, Escalated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalState::Validating => "validating",
            WithdrawalState::EligibilityChecked => "eligibility_checked",
            WithdrawalState::VerifiedImmediate => "verified_immediate",
            WithdrawalState::UnverifiedDeferred => "unverified_deferred",
            WithdrawalState::Debited => "debited",
            WithdrawalState::Fulfilling => "fulfilling",
            WithdrawalState::Recording => "recording",
            WithdrawalState::Completed => "completed",
            WithdrawalState::PendingApproval => "pending_approval",
            WithdrawalState::RollingBack => "rolling_back",
            WithdrawalState::RolledBack => "rolled_back",
            WithdrawalState::Rejected => "rejected",
            WithdrawalState::Escalated => "escalated",
        }
    }
}

impl fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the states one attempt passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTrail {
    states: Vec<WithdrawalState>,
}

impl StateTrail {
    pub fn new() -> Self {
        Self {
            states: vec![WithdrawalState::Validating],
        }
    }

    pub fn current(&self) -> WithdrawalState {
        self.states
            .last()
            .copied()
            .unwrap_or(WithdrawalState::Validating)
    }

    pub fn advance(&mut self, next: WithdrawalState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal withdrawal transition {} -> {}",
            current,
            next
        );
        debug!(from = %current, to = %next, "Withdrawal state transition");
        self.states.push(next);
    }

    pub fn states(&self) -> &[WithdrawalState] {
        &self.states
    }

    pub fn visited(&self, state: WithdrawalState) -> bool {
        self.states.contains(&state)
    }
}

impl Default for StateTrail {
    fn default() -> Self {
        Self::new()
    }
}
