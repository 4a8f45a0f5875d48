//! Withdrawal orchestrator.
//!
//! Sequences validation, eligibility, fulfillment-or-defer, debit, record
//! persistence and compensation. Once a branch is chosen the attempt runs on
//! its own task, so it reaches a terminal state even if the caller goes away.

use super::error::WithdrawError;
use super::retry::{with_retries, RetryPolicy};
use super::state::{StateTrail, WithdrawalState};
use crate::config::WithdrawConfig;
use crate::domain::events::{KIND_PENDING_WITHDRAWAL, KIND_SUCCESS_WITHDRAWAL};
use crate::domain::{
    AccountStanding, AttemptId, GainId, IdempotencyKey, NotificationLevel, OutboundEvent,
    WithdrawPayload, WithdrawalRecord, WithdrawalRequest,
};
use crate::engine::messages;
use crate::engine::{EligibilityPipeline, EligibilityVerdict, RequestValidator};
use crate::fulfillment::{FulfillmentError, FulfillmentGateway, IssuedCard};
use crate::notify::{NotificationSink, ResponseSink};
use crate::store::{
    AccountStandingProvider, BalanceLedger, EarningsAggregator, LedgerError, WithdrawalRecordStore,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

/// Note stored on Pending records created for out-of-stock cards.
pub const OUT_OF_STOCK_NOTE: &str = "out of stock";

/// Final report of one `handle` call.
#[derive(Debug, Clone)]
pub struct WithdrawReport {
    /// Absent when the request was refused before an attempt id existed.
    pub attempt_id: Option<AttemptId>,
    pub trail: StateTrail,
    pub error: Option<WithdrawError>,
    /// The attempt was already recorded and its outcome was replayed.
    pub replayed: bool,
}

impl WithdrawReport {
    pub fn state(&self) -> WithdrawalState {
        self.trail.current()
    }
}

/// Storage and vendor collaborators of the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub standing: Arc<dyn AccountStandingProvider>,
    pub earnings: Arc<dyn EarningsAggregator>,
    pub ledger: Arc<dyn BalanceLedger>,
    pub records: Arc<dyn WithdrawalRecordStore>,
    pub fulfillment: Arc<dyn FulfillmentGateway>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Per-request context carried through the settle phase.
struct Attempt {
    account: GainId,
    attempt_id: AttemptId,
    request: WithdrawalRequest,
    category: String,
    responder: Arc<dyn ResponseSink>,
    trail: StateTrail,
    /// Verified account whose immediate issuance failed.
    issue_fell_back: bool,
}

/// Removes the attempt from the in-flight registry when dropped.
struct InflightGuard {
    registry: Arc<DashMap<AttemptId, ()>>,
    attempt_id: AttemptId,
}

impl InflightGuard {
    fn try_acquire(registry: &Arc<DashMap<AttemptId, ()>>, attempt_id: &AttemptId) -> Option<Self> {
        match registry.entry(attempt_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    registry: Arc::clone(registry),
                    attempt_id: attempt_id.clone(),
                })
            }
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.attempt_id);
    }
}

#[derive(Clone)]
pub struct WithdrawalOrchestrator {
    validator: RequestValidator,
    eligibility: EligibilityPipeline,
    ledger: Arc<dyn BalanceLedger>,
    records: Arc<dyn WithdrawalRecordStore>,
    fulfillment: Arc<dyn FulfillmentGateway>,
    notifications: Arc<dyn NotificationSink>,
    config: Arc<WithdrawConfig>,
    inflight: Arc<DashMap<AttemptId, ()>>,
}

impl WithdrawalOrchestrator {
    pub fn new(collaborators: Collaborators, config: WithdrawConfig) -> Self {
        let eligibility = EligibilityPipeline::new(
            collaborators.standing,
            Arc::clone(&collaborators.ledger),
            collaborators.earnings,
            config.min_earned_to_withdraw,
        );
        Self {
            validator: RequestValidator,
            eligibility,
            ledger: collaborators.ledger,
            records: collaborators.records,
            fulfillment: collaborators.fulfillment,
            notifications: collaborators.notifications,
            config: Arc::new(config),
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &WithdrawConfig {
        &self.config
    }

    /// Handle one `onsiteGiftcardWithdraw` request.
    ///
    /// Every outcome is reported to `responder` as fixed user-facing events.
    /// The returned report carries the internal detail.
    #[instrument(skip_all, fields(gainid = tracing::field::Empty, attempt = tracing::field::Empty))]
    pub async fn handle(
        &self,
        account: Option<GainId>,
        payload: Option<WithdrawPayload>,
        responder: Arc<dyn ResponseSink>,
    ) -> WithdrawReport {
        let category = payload
            .as_ref()
            .and_then(|p| p.card_type.clone())
            .unwrap_or_default();
        let mut trail = StateTrail::new();

        // Card and country are checked before identity, the amount after.
        if let Err(e) = self.validator.validate_selection(payload.as_ref()) {
            debug!(error = %e, "Withdraw payload rejected");
            return self.refuse(trail, None, e.into(), &category, responder.as_ref());
        }
        let Some(account) = account else {
            return self.refuse(trail, None, WithdrawError::Unauthorized, &category, responder.as_ref());
        };
        let request = match self.validator.validate(payload.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Withdraw payload rejected");
                return self.refuse(trail, None, e.into(), &category, responder.as_ref());
            }
        };

        let attempt_id = match &request.request_id {
            Some(request_id) => AttemptId::derive(&account, request_id),
            None => AttemptId::generate(),
        };
        let span = Span::current();
        span.record("gainid", account.as_str());
        span.record("attempt", attempt_id.as_str());

        let Some(guard) = InflightGuard::try_acquire(&self.inflight, &attempt_id) else {
            info!("Duplicate delivery of an in-flight attempt");
            return self.refuse(
                trail,
                Some(attempt_id),
                WithdrawError::AttemptInProgress,
                &category,
                responder.as_ref(),
            );
        };

        match self.records.find(&attempt_id).await {
            Ok(Some(record)) => return self.replay(trail, record, responder.as_ref()).await,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Could not look up prior attempt");
                return self.refuse(
                    trail,
                    Some(attempt_id),
                    WithdrawError::TransientPersistence(e.to_string()),
                    &category,
                    responder.as_ref(),
                );
            }
        }

        // A compensated attempt stays closed; its debit key must not be reused.
        match self.ledger.has_movement(&IdempotencyKey::credit(&attempt_id)).await {
            Ok(false) => {}
            Ok(true) => {
                info!("Resubmission of a rolled back attempt");
                return self.refuse(
                    trail,
                    Some(attempt_id),
                    WithdrawError::AttemptRolledBack,
                    &category,
                    responder.as_ref(),
                );
            }
            Err(e) => {
                warn!(error = %e, "Could not look up prior attempt");
                return self.refuse(
                    trail,
                    Some(attempt_id),
                    WithdrawError::TransientPersistence(e.to_string()),
                    &category,
                    responder.as_ref(),
                );
            }
        }

        let standing = match self.eligibility.evaluate(&account, request.coin_amount).await {
            Ok(EligibilityVerdict::Approved(standing)) => standing,
            Ok(EligibilityVerdict::Rejected(reason)) => {
                info!(?reason, coins = request.coin_amount, "Withdrawal not eligible");
                return self.refuse(
                    trail,
                    Some(attempt_id),
                    WithdrawError::Eligibility(reason),
                    &category,
                    responder.as_ref(),
                );
            }
            Err(e) => {
                warn!(error = %e, "Eligibility sources unavailable");
                return self.refuse(
                    trail,
                    Some(attempt_id),
                    WithdrawError::TransientPersistence(e.to_string()),
                    &category,
                    responder.as_ref(),
                );
            }
        };
        trail.advance(WithdrawalState::EligibilityChecked);

        let attempt = Attempt {
            account,
            attempt_id: attempt_id.clone(),
            request,
            category,
            responder: Arc::clone(&responder),
            trail: trail.clone(),
            issue_fell_back: false,
        };
        let this = self.clone();
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                this.settle(attempt, standing).await
            }
            .instrument(span),
        );

        match task.await {
            Ok(report) => report,
            Err(join_err) => {
                error!(critical = true, error = %join_err, "Withdrawal task aborted before a terminal state");
                responder.respond(OutboundEvent::feedback(messages::BASE, ""));
                WithdrawReport {
                    attempt_id: Some(attempt_id),
                    trail,
                    error: Some(WithdrawError::InvariantViolation(join_err.to_string())),
                    replayed: false,
                }
            }
        }
    }

    /// Branch, debit, record, and compensate if needed.
    async fn settle(&self, mut attempt: Attempt, standing: AccountStanding) -> WithdrawReport {
        let request = attempt.request.clone();

        let mut issued: Option<IssuedCard> = None;
        if standing.identity_verified {
            attempt.trail.advance(WithdrawalState::VerifiedImmediate);
            match self.issue_card(&request).await {
                Ok(card) => issued = Some(card),
                Err(e) => {
                    warn!(error = %e, card = %request.card_type, "Immediate issuance failed, deferring");
                    attempt.trail.advance(WithdrawalState::UnverifiedDeferred);
                    attempt.issue_fell_back = true;
                }
            }
        } else {
            attempt.trail.advance(WithdrawalState::UnverifiedDeferred);
        }

        let mut note = None;
        if issued.is_none() && !self.stock_available(&request).await {
            if !self.config.defer_out_of_stock {
                info!(card = %request.card_type, "Card out of stock");
                return self.reject_after_branch(attempt, WithdrawError::OutOfStock);
            }
            note = Some(OUT_OF_STOCK_NOTE.to_string());
        }

        let balance = match self.debit(&attempt).await {
            Ok(balance) => balance,
            Err(e) => {
                if let Some(card) = &issued {
                    error!(
                        critical = true,
                        card = %card.card_type,
                        error = %e,
                        "Card issued but the balance could not be debited"
                    );
                }
                let err = match e {
                    LedgerError::InsufficientBalance {
                        balance, requested, ..
                    } => {
                        error!(
                            critical = true,
                            balance,
                            requested,
                            "Ledger refused a debit that passed eligibility"
                        );
                        WithdrawError::InvariantViolation(format!(
                            "debit refused after approval: balance {} < requested {}",
                            balance, requested
                        ))
                    }
                    other if other.is_transient() => WithdrawError::TransientPersistence(other.to_string()),
                    other => WithdrawError::InvariantViolation(other.to_string()),
                };
                return self.reject_after_branch(attempt, err);
            }
        };
        attempt.trail.advance(WithdrawalState::Debited);
        info!(coins = request.coin_amount, balance, "Balance debited");

        let record = match &issued {
            Some(card) => {
                attempt.trail.advance(WithdrawalState::Fulfilling);
                WithdrawalRecord::Completed {
                    attempt_id: attempt.attempt_id.clone(),
                    account: attempt.account.clone(),
                    coin_amount: request.coin_amount,
                    card_type: card.card_type,
                    country_code: request.country_code,
                    card_code: card.card_code.clone(),
                    approver: self.config.approver.clone(),
                    created_at: Utc::now(),
                }
            }
            None => {
                attempt.trail.advance(WithdrawalState::Recording);
                WithdrawalRecord::Pending {
                    attempt_id: attempt.attempt_id.clone(),
                    account: attempt.account.clone(),
                    coin_amount: request.coin_amount,
                    card_type: request.card_type,
                    country_code: request.country_code,
                    created_at: Utc::now(),
                    note,
                }
            }
        };

        if let Err(e) = self.persist(&record).await {
            error!(error = %e, "Withdrawal record could not be written, rolling back");
            attempt.trail.advance(WithdrawalState::RollingBack);
            if issued.is_some() {
                error!(critical = true, "Issued card is being voided by rollback");
            }
            return self.roll_back(attempt, e).await;
        }

        self.commit(attempt, record, balance).await
    }

    async fn issue_card(&self, request: &WithdrawalRequest) -> Result<IssuedCard, FulfillmentError> {
        let call = self.fulfillment.issue(
            request.card_type,
            request.coin_amount,
            request.country_code,
        );
        match tokio::time::timeout(self.config.fulfillment_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FulfillmentError::Timeout),
        }
    }

    /// Stock lookups fail open.
    async fn stock_available(&self, request: &WithdrawalRequest) -> bool {
        let call = self.fulfillment.check_stock(
            request.card_type,
            request.coin_amount,
            request.country_code,
        );
        match tokio::time::timeout(self.config.fulfillment_timeout, call).await {
            Ok(Ok(in_stock)) => in_stock,
            Ok(Err(e)) => {
                warn!(error = %e, "Stock check failed, assuming available");
                true
            }
            Err(_) => {
                warn!("Stock check timed out, assuming available");
                true
            }
        }
    }

    async fn debit(&self, attempt: &Attempt) -> Result<i64, LedgerError> {
        let key = IdempotencyKey::debit(&attempt.attempt_id);
        let amount = attempt.request.coin_amount;
        with_retries(self.policy(self.config.record_write_attempts), "debit", || {
            self.ledger.debit(&attempt.account, amount, &key)
        })
        .await
    }

    /// Write the record. A write that reported failure may still have landed,
    /// so a failure is confirmed with a read before it counts.
    async fn persist(&self, record: &WithdrawalRecord) -> Result<(), WithdrawError> {
        let written = with_retries(
            self.policy(self.config.record_write_attempts),
            "record_write",
            || self.records.insert(record),
        )
        .await;

        match written {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!("Record already present for attempt");
                Ok(())
            }
            Err(e) => match self.records.find(record.attempt_id()).await {
                Ok(Some(_)) => {
                    warn!(error = %e, "Record write reported failure but the record exists");
                    Ok(())
                }
                _ => Err(WithdrawError::TransientPersistence(e.to_string())),
            },
        }
    }

    async fn roll_back(&self, mut attempt: Attempt, cause: WithdrawError) -> WithdrawReport {
        let key = IdempotencyKey::credit(&attempt.attempt_id);
        let amount = attempt.request.coin_amount;
        let credited = with_retries(
            self.policy(self.config.rollback_attempts),
            "rollback_credit",
            || self.ledger.credit(&attempt.account, amount, &key),
        )
        .await;

        attempt
            .responder
            .respond(OutboundEvent::feedback(messages::BASE, attempt.category.as_str()));

        match credited {
            Ok(balance) => {
                attempt.trail.advance(WithdrawalState::RolledBack);
                warn!(coins = amount, balance, "Withdrawal rolled back");
                attempt.responder.respond(OutboundEvent::BalanceUpdate { balance });
                WithdrawReport {
                    attempt_id: Some(attempt.attempt_id),
                    trail: attempt.trail,
                    error: Some(cause),
                    replayed: false,
                }
            }
            Err(e) => {
                attempt.trail.advance(WithdrawalState::Escalated);
                error!(
                    critical = true,
                    gainid = %attempt.account,
                    attempt = %attempt.attempt_id,
                    coins = amount,
                    error = %e,
                    "Rollback credit failed; balance is debited without a withdrawal record"
                );
                WithdrawReport {
                    attempt_id: Some(attempt.attempt_id),
                    trail: attempt.trail,
                    error: Some(WithdrawError::InvariantViolation(format!(
                        "rollback failed after {}: {}",
                        cause, e
                    ))),
                    replayed: false,
                }
            }
        }
    }

    async fn commit(&self, mut attempt: Attempt, record: WithdrawalRecord, balance: i64) -> WithdrawReport {
        let coins = record.coin_amount();
        match &record {
            WithdrawalRecord::Completed {
                card_type, card_code, ..
            } => {
                attempt.trail.advance(WithdrawalState::Completed);
                info!(coins, "Withdrawal completed");
                self.notify(
                    &attempt.account,
                    KIND_SUCCESS_WITHDRAWAL,
                    &messages::success_notification(*card_type, card_code, coins),
                )
                .await;
                attempt
                    .responder
                    .respond(OutboundEvent::WithdrawalSuccess { coins });
            }
            WithdrawalRecord::Pending {
                card_type, note, ..
            } => {
                attempt.trail.advance(WithdrawalState::PendingApproval);
                info!(coins, "Withdrawal pending approval");
                self.notify(
                    &attempt.account,
                    KIND_PENDING_WITHDRAWAL,
                    &messages::pending_notification(*card_type, coins),
                )
                .await;
                let feedback = if note.is_some() {
                    messages::PENDING_RESTOCK
                } else if attempt.issue_fell_back {
                    messages::PENDING_ISSUE_DELAYED
                } else {
                    messages::PENDING_REVIEW
                };
                attempt
                    .responder
                    .respond(OutboundEvent::WithdrawalPending { coins });
                attempt
                    .responder
                    .respond(OutboundEvent::feedback(feedback, attempt.category.as_str()));
            }
        }
        attempt.responder.respond(OutboundEvent::BalanceUpdate { balance });

        WithdrawReport {
            attempt_id: Some(attempt.attempt_id),
            trail: attempt.trail,
            error: None,
            replayed: false,
        }
    }

    /// Re-emit the outcome of an attempt that already has a record.
    async fn replay(
        &self,
        mut trail: StateTrail,
        record: WithdrawalRecord,
        responder: &dyn ResponseSink,
    ) -> WithdrawReport {
        let coins = record.coin_amount();
        info!(status = record.status(), "Replaying recorded withdrawal");
        if record.is_pending() {
            trail.advance(WithdrawalState::PendingApproval);
            responder.respond(OutboundEvent::WithdrawalPending { coins });
        } else {
            trail.advance(WithdrawalState::Completed);
            responder.respond(OutboundEvent::WithdrawalSuccess { coins });
        }
        match self.ledger.balance(record.account()).await {
            Ok(balance) => responder.respond(OutboundEvent::BalanceUpdate { balance }),
            Err(e) => warn!(error = %e, "Balance unavailable for replay"),
        }

        WithdrawReport {
            attempt_id: Some(record.attempt_id().clone()),
            trail,
            error: None,
            replayed: true,
        }
    }

    async fn notify(&self, account: &GainId, kind: &str, message: &str) {
        if let Err(e) = self
            .notifications
            .notify(account, NotificationLevel::Info, kind, message)
            .await
        {
            warn!(kind, error = %e, "Notification not stored");
        }
    }

    /// Refusal before any branch was taken. Nothing has been mutated.
    fn refuse(
        &self,
        mut trail: StateTrail,
        attempt_id: Option<AttemptId>,
        err: WithdrawError,
        category: &str,
        responder: &dyn ResponseSink,
    ) -> WithdrawReport {
        trail.advance(WithdrawalState::Rejected);
        responder.respond(OutboundEvent::feedback(
            err.user_message(self.config.min_earned_to_withdraw),
            category,
        ));
        WithdrawReport {
            attempt_id,
            trail,
            error: Some(err),
            replayed: false,
        }
    }

    /// Refusal after the verified/deferred branch, still before any debit.
    fn reject_after_branch(&self, attempt: Attempt, err: WithdrawError) -> WithdrawReport {
        let Attempt {
            attempt_id,
            category,
            responder,
            trail,
            ..
        } = attempt;
        self.refuse(trail, Some(attempt_id), err, &category, responder.as_ref())
    }

    fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, self.config.retry_base_delay)
    }
}
