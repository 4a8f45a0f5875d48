//! Sequential eligibility checks run before any balance mutation.

use crate::domain::{AccountStanding, GainId};
use crate::store::{AccountStandingProvider, BalanceLedger, EarningsAggregator, LedgerError, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why an account may not withdraw right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityFailure {
    Suspended,
    EmailNotVerified,
    InsufficientBalance { balance: i64, requested: i64 },
    InsufficientEarnings { earned: i64, required: i64 },
}

/// Result of one pipeline pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityVerdict {
    /// Carries the standing snapshot so the caller can branch on identity
    /// verification without another read.
    Approved(AccountStanding),
    Rejected(EligibilityFailure),
}

impl EligibilityVerdict {
    pub fn ok(&self) -> bool {
        matches!(self, EligibilityVerdict::Approved(_))
    }

    pub fn failure_reason(&self) -> Option<EligibilityFailure> {
        match self {
            EligibilityVerdict::Approved(_) => None,
            EligibilityVerdict::Rejected(reason) => Some(*reason),
        }
    }
}

/// A contributing source could not be read.
#[derive(Debug, Error)]
pub enum EligibilityError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Standing, email, balance and earnings checks, in that order.
///
/// The first failing check decides the verdict; later checks are not run.
#[derive(Clone)]
pub struct EligibilityPipeline {
    standing: Arc<dyn AccountStandingProvider>,
    ledger: Arc<dyn BalanceLedger>,
    earnings: Arc<dyn EarningsAggregator>,
    min_earned_to_withdraw: i64,
}

impl EligibilityPipeline {
    pub fn new(
        standing: Arc<dyn AccountStandingProvider>,
        ledger: Arc<dyn BalanceLedger>,
        earnings: Arc<dyn EarningsAggregator>,
        min_earned_to_withdraw: i64,
    ) -> Self {
        Self {
            standing,
            ledger,
            earnings,
            min_earned_to_withdraw,
        }
    }

    pub fn min_earned_to_withdraw(&self) -> i64 {
        self.min_earned_to_withdraw
    }

    pub async fn evaluate(
        &self,
        account: &GainId,
        coin_amount: i64,
    ) -> Result<EligibilityVerdict, EligibilityError> {
        let standing = self.standing.fetch(account).await?;
        if let Err(reason) = check_standing(&standing).and_then(|_| check_email(&standing)) {
            debug!(gainid = %account, ?reason, "Eligibility rejected");
            return Ok(EligibilityVerdict::Rejected(reason));
        }

        let balance = self.ledger.balance(account).await?;
        if let Err(reason) = check_balance(balance, coin_amount) {
            debug!(gainid = %account, ?reason, "Eligibility rejected");
            return Ok(EligibilityVerdict::Rejected(reason));
        }

        let earned = self.earnings.sum(account).await?;
        if let Err(reason) = check_earnings(earned, self.min_earned_to_withdraw) {
            debug!(gainid = %account, ?reason, "Eligibility rejected");
            return Ok(EligibilityVerdict::Rejected(reason));
        }

        Ok(EligibilityVerdict::Approved(standing))
    }
}

fn check_standing(standing: &AccountStanding) -> Result<(), EligibilityFailure> {
    if standing.is_suspended() {
        return Err(EligibilityFailure::Suspended);
    }
    Ok(())
}

fn check_email(standing: &AccountStanding) -> Result<(), EligibilityFailure> {
    if !standing.email_verified {
        return Err(EligibilityFailure::EmailNotVerified);
    }
    Ok(())
}

fn check_balance(balance: i64, requested: i64) -> Result<(), EligibilityFailure> {
    if balance < requested {
        return Err(EligibilityFailure::InsufficientBalance { balance, requested });
    }
    Ok(())
}

fn check_earnings(earned: i64, required: i64) -> Result<(), EligibilityFailure> {
    if earned < required {
        return Err(EligibilityFailure::InsufficientEarnings { earned, required });
    }
    Ok(())
}
