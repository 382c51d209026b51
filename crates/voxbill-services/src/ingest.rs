//! Webhook ingestion orchestrator
//!
//! Sequences one inbound carrier lifecycle event through the pipeline:
//! Received → Deduplicated → StateApplied → Costed → Ledgered → TopupChecked
//! → Acknowledged.
//!
//! Stage isolation rules:
//! - A duplicate delivery short-circuits after Deduplicated with no side
//!   effects.
//! - The ledger debit commits before the call row is rewritten; on a crash
//!   in between, the carrier's retry re-runs the pipeline and the keyed
//!   debit returns its recorded outcome instead of double-billing.
//! - A top-up failure never rolls back the ledger or fails the ack.
//! - A hard failure releases the idempotency record and propagates, so the
//!   carrier retries the delivery.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use voxbill_core::{
    models::{event_key, Admission, Call, CallState, LedgerReason, TopupOutcome, Transition},
    traits::{
        CallRepository, IdempotencyStore, LedgerRepository, RateResolver, UserRepository,
    },
    AppError, AppResult,
};

use crate::constants::call_debit_key;
use crate::ledger::LedgerManager;
use crate::topup::TopupCheck;

/// One inbound lifecycle notification from the telephony carrier
#[derive(Debug, Clone)]
pub struct CallStatusEvent {
    /// Carrier-assigned call session id
    pub external_call_id: String,

    /// Reported lifecycle status
    pub status: CallState,

    /// Elapsed duration in seconds
    pub duration_seconds: i32,

    /// Caller number
    pub origin_number: String,

    /// Called number
    pub destination_number: String,

    /// Destination country/rate code, when the carrier provides it
    pub destination_country: Option<String>,

    /// Parent call session id for nested legs
    pub parent_call_id: Option<String>,
}

impl CallStatusEvent {
    /// Deterministic idempotency key for this delivery
    pub fn event_key(&self) -> String {
        event_key(
            &self.external_call_id,
            &self.status.to_string(),
            self.duration_seconds,
        )
    }
}

/// Acknowledgment returned to the carrier-facing handler
///
/// Every variant is acknowledged with a success code; only a propagated
/// `AppError` causes a non-success response (and thus a carrier retry).
#[derive(Debug, Clone)]
pub enum Acknowledgement {
    /// The event was applied to the call record
    Applied {
        call_id: Uuid,
        state: CallState,
        cost: Option<Decimal>,
        topup: Option<TopupOutcome>,
    },
    /// The event was already processed; no side effects ran
    Duplicate,
    /// The transition was invalid (out-of-order or terminal); no-op
    RejectedNoOp { reason: String },
}

impl Acknowledgement {
    /// Short disposition string recorded on the idempotency record
    pub fn summary(&self) -> String {
        match self {
            Acknowledgement::Applied { state, cost, .. } => match cost {
                Some(c) => format!("applied:{} cost:{}", state, c),
                None => format!("applied:{}", state),
            },
            Acknowledgement::Duplicate => "duplicate".to_string(),
            Acknowledgement::RejectedNoOp { reason } => format!("rejected:{}", reason),
        }
    }
}

/// Webhook ingestion orchestrator
pub struct IngestService<CR, UR, RES, LR, IDS, TOP>
where
    CR: CallRepository,
    UR: UserRepository,
    RES: RateResolver,
    LR: LedgerRepository,
    IDS: IdempotencyStore,
    TOP: TopupCheck,
{
    calls: Arc<CR>,
    users: Arc<UR>,
    rates: Arc<RES>,
    ledger: Arc<LedgerManager<LR>>,
    guard: Arc<IDS>,
    topup: Arc<TOP>,
}

impl<CR, UR, RES, LR, IDS, TOP> IngestService<CR, UR, RES, LR, IDS, TOP>
where
    CR: CallRepository,
    UR: UserRepository,
    RES: RateResolver,
    LR: LedgerRepository,
    IDS: IdempotencyStore,
    TOP: TopupCheck,
{
    /// Create a new ingestion orchestrator
    pub fn new(
        calls: Arc<CR>,
        users: Arc<UR>,
        rates: Arc<RES>,
        ledger: Arc<LedgerManager<LR>>,
        guard: Arc<IDS>,
        topup: Arc<TOP>,
    ) -> Self {
        Self {
            calls,
            users,
            rates,
            ledger,
            guard,
            topup,
        }
    }

    /// Process one inbound lifecycle event
    #[instrument(skip(self, event), fields(call = %event.external_call_id, status = %event.status))]
    pub async fn process(&self, event: CallStatusEvent) -> AppResult<Acknowledgement> {
        let key = event.event_key();

        if self.guard.admit(&key).await? == Admission::AlreadyProcessed {
            info!("Duplicate delivery for {}, acknowledging without side effects", key);
            return Ok(Acknowledgement::Duplicate);
        }

        match self.run_pipeline(&event).await {
            Ok(ack) => {
                if let Err(e) = self.guard.complete(&key, &ack.summary()).await {
                    // The record exists; the summary is advisory.
                    warn!("Failed to record outcome for {}: {}", key, e);
                }
                Ok(ack)
            }
            Err(e) => {
                error!("Pipeline failed for {}: {}", key, e);
                if let Err(release_err) = self.guard.release(&key).await {
                    error!(
                        "Failed to release idempotency record {}: {}",
                        key, release_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Run the post-deduplication stages
    async fn run_pipeline(&self, event: &CallStatusEvent) -> AppResult<Acknowledgement> {
        let now = Utc::now();

        let (mut call, transition) = self.load_or_synthesize(event, now).await?;

        if let Transition::Rejected { reason } = transition {
            info!("Transition rejected: {}", reason);
            return Ok(Acknowledgement::RejectedNoOp { reason });
        }

        let entered_terminal = call.state.is_terminal() && call.cost.is_none();

        if !entered_terminal {
            let call = self.calls.update(&call).await?;
            return Ok(Acknowledgement::Applied {
                call_id: call.id,
                state: call.state,
                cost: call.cost,
                topup: None,
            });
        }

        // Costed: the only place a call's cost is ever computed.
        let mut cost = self.compute_cost(&mut call).await?;

        // Ledgered: debit before the call row is rewritten, so a crash in
        // between is healed by the keyed retry.
        if cost > Decimal::ZERO {
            match call.owner_user_id {
                Some(owner) => {
                    let applied = self
                        .ledger
                        .apply_transaction(
                            owner,
                            -cost,
                            LedgerReason::Call,
                            &call_debit_key(&call.external_call_id),
                            Some(call.id),
                        )
                        .await?;

                    if applied.duplicate {
                        // An earlier attempt already recorded this debit;
                        // its amount stays authoritative for the call row.
                        cost = -applied.entry.amount;
                    }

                    if applied.new_balance < Decimal::ZERO {
                        warn!(
                            "User {} balance went negative ({}) after call {}",
                            owner, applied.new_balance, call.external_call_id
                        );
                    }
                }
                None => {
                    // Chargeable but unattributable: keep the cost on record
                    // and leave it to manual review.
                    warn!(
                        "Call {} has cost {} but no resolvable owner",
                        call.external_call_id, cost
                    );
                    call.flagged_for_audit = true;
                }
            }
        }

        call.finalize_cost(cost);
        let call = self.calls.update(&call).await?;

        // TopupChecked: isolated; a failure here must never unwind the
        // already-committed debit.
        let topup = match call.owner_user_id {
            Some(owner) => Some(match self.topup.check_and_trigger(owner).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Top-up check failed for user {}: {}", owner, e);
                    TopupOutcome::Failed(e.to_string())
                }
            }),
            None => None,
        };

        Ok(Acknowledgement::Applied {
            call_id: call.id,
            state: call.state,
            cost: call.cost,
            topup,
        })
    }

    /// Find the referenced call and apply the transition, or synthesize a
    /// record starting in the observed state
    async fn load_or_synthesize(
        &self,
        event: &CallStatusEvent,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<(Call, Transition)> {
        if let Some(mut call) = self
            .calls
            .find_by_external_id(&event.external_call_id)
            .await?
        {
            let transition = call.apply_transition(event.status, event.duration_seconds, now);
            return Ok((call, transition));
        }

        warn!(
            "No record for call {}, synthesizing in state {}",
            event.external_call_id, event.status
        );

        let owner = self.users.find_by_phone(&event.origin_number).await?;

        let mut call = Call::synthesize(
            event.external_call_id.clone(),
            event.origin_number.clone(),
            event.destination_number.clone(),
            event.destination_country.clone(),
            event.status,
            event.duration_seconds,
            owner.as_ref().map(|u| u.id),
            now,
        );
        call.origin_country = owner.and_then(|u| u.country_code);

        match self.calls.insert(&call).await {
            Ok(call) => {
                let entered = call.state; // already in the observed state
                debug!(
                    "Synthesized call {} in state {}",
                    call.external_call_id, entered
                );
                Ok((
                    call,
                    Transition::Applied {
                        entered_terminal: entered.is_terminal(),
                    },
                ))
            }
            Err(AppError::AlreadyExists(_)) => {
                // Lost a race with a concurrent event for the same unknown
                // call; fall back to the regular transition path.
                let mut call = self
                    .calls
                    .find_by_external_id(&event.external_call_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Call {} exists but is not readable",
                            event.external_call_id
                        ))
                    })?;
                let transition = call.apply_transition(event.status, event.duration_seconds, now);
                Ok((call, transition))
            }
            Err(e) => Err(e),
        }
    }

    /// Compute the final cost for a terminal call
    ///
    /// A missing rate is not "free": the call finalizes at zero and is
    /// flagged for manual audit, because billing nothing for a completed
    /// call is a revenue-losing failure mode.
    async fn compute_cost(&self, call: &mut Call) -> AppResult<Decimal> {
        if call.duration_seconds <= 0 {
            return Ok(Decimal::ZERO);
        }

        let Some(destination) = call.destination_country.clone() else {
            warn!(
                "Call {} finalized without a destination code, flagging for audit",
                call.external_call_id
            );
            call.flagged_for_audit = true;
            return Ok(Decimal::ZERO);
        };

        match self
            .rates
            .resolve(&destination, call.origin_country.as_deref())
            .await?
        {
            Some(rate) => Ok(rate.cost_for(call.duration_seconds)),
            None => {
                warn!(
                    "No rate for destination {} (origin {:?}), call {} flagged for audit",
                    destination, call.origin_country, call.external_call_id
                );
                call.flagged_for_audit = true;
                Ok(Decimal::ZERO)
            }
        }
    }
}
