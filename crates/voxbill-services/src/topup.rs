//! Auto top-up trigger
//!
//! Observes the balance after a ledger mutation and initiates a top-up
//! through the payment gateway when it crossed the policy threshold. At most
//! one top-up request is in flight per user at a time, enforced by an atomic
//! `SET NX EX` marker in Redis.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use voxbill_cache::keys;
use voxbill_core::{
    models::{LedgerReason, TopupOutcome},
    traits::{CacheService, ChargeOutcome, LedgerRepository, PaymentGateway, TopupPolicyRepository},
    AppResult,
};

use crate::constants::topup_credit_key;
use crate::ledger::LedgerManager;

/// Trait for the top-up check seam
///
/// Lets the ingestion orchestrator depend on the check without carrying the
/// trigger's full set of generic parameters.
#[async_trait]
pub trait TopupCheck: Send + Sync {
    /// Check the user's balance against their policy and trigger if needed
    async fn check_and_trigger(&self, user_id: Uuid) -> AppResult<TopupOutcome>;
}

/// Auto top-up trigger implementation
pub struct TopupTrigger<L, P, G, C>
where
    L: LedgerRepository,
    P: TopupPolicyRepository,
    G: PaymentGateway,
    C: CacheService,
{
    ledger: Arc<LedgerManager<L>>,
    policies: Arc<P>,
    gateway: Arc<G>,
    cache: Arc<C>,
    marker_ttl_secs: u64,
    gateway_timeout_ms: u64,
}

impl<L, P, G, C> TopupTrigger<L, P, G, C>
where
    L: LedgerRepository,
    P: TopupPolicyRepository,
    G: PaymentGateway,
    C: CacheService,
{
    /// Create a new top-up trigger
    ///
    /// `marker_ttl_secs` must exceed `gateway_timeout_ms` so the in-flight
    /// marker outlives any answered request.
    pub fn new(
        ledger: Arc<LedgerManager<L>>,
        policies: Arc<P>,
        gateway: Arc<G>,
        cache: Arc<C>,
        marker_ttl_secs: u64,
        gateway_timeout_ms: u64,
    ) -> Self {
        Self {
            ledger,
            policies,
            gateway,
            cache,
            marker_ttl_secs,
            gateway_timeout_ms,
        }
    }

    /// Release the in-flight marker after the gateway responded
    async fn release_marker(&self, marker: &str) {
        if let Err(e) = self.cache.delete(marker).await {
            // The marker TTL self-heals; just note it.
            warn!("Failed to release top-up marker {}: {}", marker, e);
        }
    }
}

#[async_trait]
impl<L, P, G, C> TopupCheck for TopupTrigger<L, P, G, C>
where
    L: LedgerRepository,
    P: TopupPolicyRepository,
    G: PaymentGateway,
    C: CacheService,
{
    #[instrument(skip(self))]
    async fn check_and_trigger(&self, user_id: Uuid) -> AppResult<TopupOutcome> {
        let Some(policy) = self.policies.find_by_user(user_id).await? else {
            return Ok(TopupOutcome::NotNeeded);
        };

        let balance = self.ledger.balance_of(user_id).await?;
        if !policy.should_trigger(balance) {
            return Ok(TopupOutcome::NotNeeded);
        }

        debug!(
            "Balance {} below threshold {} for user {}, requesting top-up of {}",
            balance, policy.threshold, user_id, policy.topup_amount
        );

        let marker = keys::topup_inflight_key(&user_id.to_string());
        if !self
            .cache
            .set_nx(&marker, "1", self.marker_ttl_secs)
            .await?
        {
            debug!("Top-up already in flight for user {}", user_id);
            return Ok(TopupOutcome::AlreadyInFlight);
        }

        let charge = tokio::time::timeout(
            Duration::from_millis(self.gateway_timeout_ms),
            self.gateway.charge(user_id, policy.topup_amount),
        )
        .await;

        let outcome = match charge {
            Err(_) => {
                // No gateway response: the charge may still land, so the
                // marker is left to expire on its own TTL.
                error!(
                    "Payment gateway timed out after {}ms for user {}",
                    self.gateway_timeout_ms, user_id
                );
                return Ok(TopupOutcome::Failed(format!(
                    "gateway timeout after {}ms",
                    self.gateway_timeout_ms
                )));
            }
            Ok(Err(e)) => {
                warn!("Payment gateway error for user {}: {}", user_id, e);
                TopupOutcome::Failed(e.to_string())
            }
            Ok(Ok(ChargeOutcome::Declined { reason })) => {
                warn!("Top-up declined for user {}: {}", user_id, reason);
                TopupOutcome::Failed(reason)
            }
            Ok(Ok(ChargeOutcome::Approved { provider_reference })) => {
                let key = topup_credit_key(&provider_reference);
                match self
                    .ledger
                    .apply_transaction(user_id, policy.topup_amount, LedgerReason::Topup, &key, None)
                    .await
                {
                    Ok(applied) => {
                        info!(
                            "Top-up of {} credited for user {}, new balance {}",
                            policy.topup_amount, user_id, applied.new_balance
                        );
                        TopupOutcome::Triggered(policy.topup_amount)
                    }
                    Err(e) => {
                        // The gateway approved but the credit did not land;
                        // the provider reference keyed the credit, so replaying
                        // it later cannot double-credit.
                        error!(
                            "Approved top-up {} failed to credit for user {}: {}",
                            provider_reference, user_id, e
                        );
                        TopupOutcome::Failed(format!("credit failed after approval: {}", e))
                    }
                }
            }
        };

        self.release_marker(&marker).await;
        Ok(outcome)
    }
}
