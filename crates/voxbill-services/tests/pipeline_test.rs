//! End-to-end pipeline tests over in-memory fakes
//!
//! Exercises the webhook ingestion orchestrator against the full set of
//! billing invariants: exactly-once side effects under duplicate delivery,
//! ledger/balance consistency, rounding, terminal-state preservation,
//! audit flagging, and top-up exclusivity.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use voxbill_core::models::{
    Admission, AppliedTransaction, AutoTopupPolicy, Call, CallState, LedgerEntry, LedgerReason,
    RateEntry, TopupOutcome, User,
};
use voxbill_core::traits::{
    CacheService, CallRepository, ChargeOutcome, IdempotencyStore, LedgerRepository,
    PaymentGateway, RateRepository, TopupPolicyRepository, UserRepository,
};
use voxbill_core::{AppError, AppResult};
use voxbill_services::{
    Acknowledgement, CallStatusEvent, IngestService, LedgerManager, RatingService, TopupCheck,
    TopupTrigger,
};

// ==================== In-memory fakes ====================

#[derive(Default)]
struct InMemoryCallRepo {
    calls: Mutex<HashMap<String, Call>>,
}

#[async_trait]
impl CallRepository for InMemoryCallRepo {
    async fn find_by_external_id(&self, external_call_id: &str) -> AppResult<Option<Call>> {
        Ok(self.calls.lock().unwrap().get(external_call_id).cloned())
    }

    async fn insert(&self, call: &Call) -> AppResult<Call> {
        let mut calls = self.calls.lock().unwrap();
        if calls.contains_key(&call.external_call_id) {
            return Err(AppError::AlreadyExists(call.external_call_id.clone()));
        }
        calls.insert(call.external_call_id.clone(), call.clone());
        Ok(call.clone())
    }

    async fn update(&self, call: &Call) -> AppResult<Call> {
        self.calls
            .lock()
            .unwrap()
            .insert(call.external_call_id.clone(), call.clone());
        Ok(call.clone())
    }
}

#[derive(Default)]
struct InMemoryUserRepo {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        let normalized = User::normalize_phone(phone);
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.phone_number == normalized)
            .cloned())
    }
}

#[derive(Default)]
struct InMemoryRateRepo {
    rates: Mutex<Vec<RateEntry>>,
}

#[async_trait]
impl RateRepository for InMemoryRateRepo {
    async fn find_exact(
        &self,
        destination_code: &str,
        origin_context: &str,
    ) -> AppResult<Option<RateEntry>> {
        Ok(self
            .rates
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.active
                    && r.destination_code == destination_code
                    && r.origin_context.as_deref() == Some(origin_context)
            })
            .cloned())
    }

    async fn find_fallback(&self, destination_code: &str) -> AppResult<Option<RateEntry>> {
        Ok(self
            .rates
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.active && r.destination_code == destination_code && r.origin_context.is_none()
            })
            .cloned())
    }
}

/// Single-mutex ledger state, modelling the database transaction boundary
#[derive(Default)]
struct LedgerState {
    balances: HashMap<Uuid, Decimal>,
    entries: Vec<LedgerEntry>,
}

#[derive(Default)]
struct InMemoryLedgerRepo {
    state: Mutex<LedgerState>,
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepo {
    async fn apply(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: LedgerReason,
        idempotency_key: &str,
        related_call_id: Option<Uuid>,
    ) -> AppResult<AppliedTransaction> {
        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state
            .entries
            .iter()
            .find(|e| e.idempotency_key == idempotency_key)
        {
            let entry = existing.clone();
            let new_balance = entry.balance_after;
            return Ok(AppliedTransaction {
                entry,
                new_balance,
                duplicate: true,
            });
        }

        let balance = state
            .balances
            .get(&user_id)
            .copied()
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;
        let new_balance = balance + amount;

        let entry = LedgerEntry {
            id: state.entries.len() as i64 + 1,
            user_id,
            amount,
            reason,
            related_call_id,
            idempotency_key: idempotency_key.to_string(),
            balance_after: new_balance,
            created_at: Utc::now(),
        };

        state.balances.insert(user_id, new_balance);
        state.entries.push(entry.clone());

        Ok(AppliedTransaction {
            entry,
            new_balance,
            duplicate: false,
        })
    }

    async fn balance_of(&self, user_id: Uuid) -> AppResult<Decimal> {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&user_id)
            .copied()
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<LedgerEntry>, i64)> {
        let state = self.state.lock().unwrap();
        let all: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[derive(Default)]
struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, Option<String>>>,
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn admit(&self, event_key: &str) -> AppResult<Admission> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(event_key) {
            Ok(Admission::AlreadyProcessed)
        } else {
            records.insert(event_key.to_string(), None);
            Ok(Admission::Admitted)
        }
    }

    async fn complete(&self, event_key: &str, outcome_summary: &str) -> AppResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(event_key.to_string(), Some(outcome_summary.to_string()));
        Ok(())
    }

    async fn release(&self, event_key: &str) -> AppResult<()> {
        self.records.lock().unwrap().remove(event_key);
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryPolicyRepo {
    policies: Mutex<HashMap<Uuid, AutoTopupPolicy>>,
}

#[async_trait]
impl TopupPolicyRepository for InMemoryPolicyRepo {
    async fn find_by_user(&self, user_id: Uuid) -> AppResult<Option<AutoTopupPolicy>> {
        Ok(self.policies.lock().unwrap().get(&user_id).cloned())
    }
}

/// Atomic in-memory cache; `set_nx` is check-and-set under one lock
#[derive(Default)]
struct InMemoryCache {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.values.lock().unwrap().get(key) {
            Some(json) => Ok(Some(
                serde_json::from_str(json).map_err(|e| AppError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        _ttl_secs: u64,
    ) -> Result<(), AppError> {
        let json =
            serde_json::to_string(value).map_err(|e| AppError::Serialization(e.to_string()))?;
        self.values.lock().unwrap().insert(key.to_string(), json);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<bool, AppError> {
        let mut values = self.values.lock().unwrap();
        if values.contains_key(key) {
            Ok(false)
        } else {
            values.insert(key.to_string(), format!("\"{}\"", value));
            Ok(true)
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.values.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }
}

/// Gateway that approves every charge after an optional delay
struct FakeGateway {
    charges: AtomicU32,
    delay_ms: u64,
    approve: bool,
}

impl FakeGateway {
    fn approving() -> Self {
        Self {
            charges: AtomicU32::new(0),
            delay_ms: 0,
            approve: true,
        }
    }

    fn declining() -> Self {
        Self {
            charges: AtomicU32::new(0),
            delay_ms: 0,
            approve: false,
        }
    }

    fn slow_approving(delay_ms: u64) -> Self {
        Self {
            charges: AtomicU32::new(0),
            delay_ms,
            approve: true,
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn charge(&self, _user_id: Uuid, _amount: Decimal) -> AppResult<ChargeOutcome> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        if self.approve {
            Ok(ChargeOutcome::Approved {
                provider_reference: format!("ch_{}", n),
            })
        } else {
            Ok(ChargeOutcome::Declined {
                reason: "card_declined".to_string(),
            })
        }
    }
}

// ==================== Test environment ====================

type TestIngest = IngestService<
    InMemoryCallRepo,
    InMemoryUserRepo,
    RatingService<InMemoryRateRepo, InMemoryCache>,
    InMemoryLedgerRepo,
    InMemoryIdempotencyStore,
    TopupTrigger<InMemoryLedgerRepo, InMemoryPolicyRepo, FakeGateway, InMemoryCache>,
>;

struct TestEnv {
    calls: Arc<InMemoryCallRepo>,
    ledger_repo: Arc<InMemoryLedgerRepo>,
    ledger: Arc<LedgerManager<InMemoryLedgerRepo>>,
    gateway: Arc<FakeGateway>,
    user_id: Uuid,
    ingest: TestIngest,
}

/// Build a pipeline around one user with the given balance and rate table
fn env_with(balance: Decimal, rates: Vec<RateEntry>, gateway: FakeGateway) -> TestEnv {
    let user = User {
        phone_number: "15551234567".to_string(),
        country_code: Some("US".to_string()),
        balance,
        ..Default::default()
    };
    let user_id = user.id;

    let calls = Arc::new(InMemoryCallRepo::default());
    let users = Arc::new(InMemoryUserRepo::default());
    users.users.lock().unwrap().push(user);

    let rate_repo = Arc::new(InMemoryRateRepo::default());
    *rate_repo.rates.lock().unwrap() = rates;

    let ledger_repo = Arc::new(InMemoryLedgerRepo::default());
    ledger_repo
        .state
        .lock()
        .unwrap()
        .balances
        .insert(user_id, balance);

    let cache = Arc::new(InMemoryCache::default());
    let resolver = Arc::new(RatingService::new(rate_repo, cache.clone(), 60));
    let ledger = Arc::new(LedgerManager::with_retries(ledger_repo.clone(), 3, 1));
    let policies = Arc::new(InMemoryPolicyRepo::default());
    let gateway = Arc::new(gateway);
    let topup = Arc::new(TopupTrigger::new(
        ledger.clone(),
        policies.clone(),
        gateway.clone(),
        cache,
        30,
        1000,
    ));
    let guard = Arc::new(InMemoryIdempotencyStore::default());

    let ingest = IngestService::new(
        calls.clone(),
        users,
        resolver,
        ledger.clone(),
        guard,
        topup,
    );

    TestEnv {
        calls,
        ledger_repo,
        ledger,
        gateway,
        user_id,
        ingest,
    }
}

impl TestEnv {
    fn stored_call(&self, external_id: &str) -> Call {
        self.calls
            .calls
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .expect("call should exist")
    }

    fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.ledger_repo.state.lock().unwrap().entries.clone()
    }

    fn balance(&self) -> Decimal {
        self.ledger_repo
            .state
            .lock()
            .unwrap()
            .balances
            .get(&self.user_id)
            .copied()
            .unwrap()
    }

    /// Ledger-balance consistency: starting balance plus the sum of all
    /// entry amounts must equal the current balance
    fn assert_ledger_consistent(&self, starting_balance: Decimal) {
        let sum: Decimal = self.ledger_entries().iter().map(|e| e.amount).sum();
        assert_eq!(starting_balance + sum, self.balance());
    }
}

fn usd_rate(code: &str, per_minute: Decimal) -> RateEntry {
    RateEntry {
        destination_code: code.to_string(),
        per_minute_rate: per_minute,
        ..Default::default()
    }
}

fn event(external_id: &str, status: CallState, duration: i32) -> CallStatusEvent {
    CallStatusEvent {
        external_call_id: external_id.to_string(),
        status,
        duration_seconds: duration,
        origin_number: "15551234567".to_string(),
        destination_number: "51999888777".to_string(),
        destination_country: Some("51".to_string()),
        parent_call_id: None,
    }
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_completed_call_bills_rounded_up_minute() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    let ack = env
        .ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();

    match ack {
        Acknowledgement::Applied { cost, .. } => assert_eq!(cost, Some(dec!(0.10))),
        other => panic!("expected Applied, got {:?}", other),
    }

    assert_eq!(env.balance(), dec!(9.90));
    let entries = env.ledger_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, dec!(-0.10));
    assert_eq!(entries[0].reason, LedgerReason::Call);
    assert!(entries[0].related_call_id.is_some());
    env.assert_ledger_consistent(dec!(10.00));
}

#[tokio::test]
async fn test_duplicate_delivery_bills_exactly_once() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    let first = env
        .ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();
    assert!(matches!(first, Acknowledgement::Applied { .. }));

    let second = env
        .ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();
    assert!(matches!(second, Acknowledgement::Duplicate));

    assert_eq!(env.ledger_entries().len(), 1);
    assert_eq!(env.balance(), dec!(9.90));
}

#[tokio::test]
async fn test_distinct_lifecycle_events_are_not_duplicates() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    let ringing = env
        .ingest
        .process(event("c1", CallState::Ringing, 0))
        .await
        .unwrap();
    assert!(matches!(ringing, Acknowledgement::Applied { .. }));

    let completed = env
        .ingest
        .process(event("c1", CallState::Completed, 61))
        .await
        .unwrap();
    match completed {
        Acknowledgement::Applied { cost, .. } => assert_eq!(cost, Some(dec!(0.20))),
        other => panic!("expected Applied, got {:?}", other),
    }

    assert_eq!(env.balance(), dec!(9.80));
}

#[tokio::test]
async fn test_event_after_terminal_state_is_a_noop() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    env.ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();

    let late = env
        .ingest
        .process(event("c1", CallState::Ringing, 0))
        .await
        .unwrap();
    assert!(matches!(late, Acknowledgement::RejectedNoOp { .. }));

    let call = env.stored_call("c1");
    assert_eq!(call.state, CallState::Completed);
    assert_eq!(call.cost, Some(dec!(0.10)));
    assert_eq!(env.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_missing_rate_finalizes_at_zero_with_audit_flag() {
    let env = env_with(dec!(10.00), vec![], FakeGateway::approving());

    let ack = env
        .ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();
    assert!(matches!(ack, Acknowledgement::Applied { .. }));

    let call = env.stored_call("c1");
    assert_eq!(call.cost, Some(Decimal::ZERO));
    assert!(call.flagged_for_audit);
    assert!(env.ledger_entries().is_empty());
    assert_eq!(env.balance(), dec!(10.00));
}

#[tokio::test]
async fn test_failed_call_with_duration_is_billed() {
    // Answered then dropped mid-billing: cost follows the completed path
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    env.ingest
        .process(event("c1", CallState::Answered, 0))
        .await
        .unwrap();
    let ack = env
        .ingest
        .process(event("c1", CallState::Failed, 30))
        .await
        .unwrap();

    match ack {
        Acknowledgement::Applied { cost, .. } => assert_eq!(cost, Some(dec!(0.10))),
        other => panic!("expected Applied, got {:?}", other),
    }
    assert_eq!(env.balance(), dec!(9.90));
}

#[tokio::test]
async fn test_cancelled_call_without_duration_is_free() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    env.ingest
        .process(event("c1", CallState::Ringing, 0))
        .await
        .unwrap();
    let ack = env
        .ingest
        .process(event("c1", CallState::Cancelled, 0))
        .await
        .unwrap();
    assert!(matches!(ack, Acknowledgement::Applied { .. }));

    let call = env.stored_call("c1");
    assert_eq!(call.cost, Some(Decimal::ZERO));
    assert!(!call.flagged_for_audit);
    assert!(env.ledger_entries().is_empty());
    assert_eq!(env.balance(), dec!(10.00));
}

#[tokio::test]
async fn test_debit_can_drive_balance_negative() {
    let env = env_with(
        dec!(0.05),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    env.ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();

    assert_eq!(env.balance(), dec!(-0.05));
    env.assert_ledger_consistent(dec!(0.05));
}

#[tokio::test]
async fn test_unknown_caller_synthesis_flags_audit_and_skips_billing() {
    let env = env_with(
        dec!(10.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    let mut ev = event("mystery", CallState::Completed, 45);
    ev.origin_number = "19990000000".to_string(); // no such user

    let ack = env.ingest.process(ev).await.unwrap();
    assert!(matches!(ack, Acknowledgement::Applied { .. }));

    let call = env.stored_call("mystery");
    assert!(call.flagged_for_audit);
    assert!(call.owner_user_id.is_none());
    assert!(env.ledger_entries().is_empty());
}

#[tokio::test]
async fn test_ledger_balance_consistency_across_mixed_events() {
    let env = env_with(
        dec!(5.00),
        vec![usd_rate("51", dec!(0.10))],
        FakeGateway::approving(),
    );

    for (id, secs) in [("a", 45), ("b", 61), ("c", 600)] {
        env.ingest
            .process(event(id, CallState::Completed, secs))
            .await
            .unwrap();
    }

    // 0.10 + 0.20 + 1.00 debited
    assert_eq!(env.balance(), dec!(3.70));
    env.assert_ledger_consistent(dec!(5.00));
}

// ==================== Top-up scenarios ====================

/// Environment plus a populated policy repo for driving a trigger directly
fn env_with_policy(
    balance: Decimal,
    threshold: Decimal,
    topup_amount: Decimal,
    gateway: FakeGateway,
) -> (TestEnv, Arc<InMemoryPolicyRepo>) {
    let env = env_with(balance, vec![usd_rate("51", dec!(0.10))], gateway);

    let policies = Arc::new(InMemoryPolicyRepo::default());
    policies.policies.lock().unwrap().insert(
        env.user_id,
        AutoTopupPolicy {
            user_id: env.user_id,
            enabled: true,
            threshold,
            topup_amount,
            updated_at: Utc::now(),
        },
    );
    (env, policies)
}

#[tokio::test]
async fn test_topup_triggers_after_threshold_crossing() {
    // Balance $1.50, threshold $2.00, top-up $10.00, a $0.10 call completes
    let (env, policies) = env_with_policy(
        dec!(1.50),
        dec!(2.00),
        dec!(10.00),
        FakeGateway::approving(),
    );

    let cache = Arc::new(InMemoryCache::default());
    let trigger = TopupTrigger::new(
        env.ledger.clone(),
        policies,
        env.gateway.clone(),
        cache,
        30,
        1000,
    );

    env.ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();
    assert_eq!(env.balance(), dec!(1.40));

    let outcome = trigger.check_and_trigger(env.user_id).await.unwrap();
    assert_eq!(outcome, TopupOutcome::Triggered(dec!(10.00)));

    assert_eq!(env.balance(), dec!(11.40));
    let entries = env.ledger_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].amount, dec!(10.00));
    assert_eq!(entries[1].reason, LedgerReason::Topup);
    env.assert_ledger_consistent(dec!(1.50));
}

#[tokio::test]
async fn test_topup_not_needed_above_threshold() {
    let (env, policies) = env_with_policy(
        dec!(5.00),
        dec!(2.00),
        dec!(10.00),
        FakeGateway::approving(),
    );

    let cache = Arc::new(InMemoryCache::default());
    let trigger = TopupTrigger::new(
        env.ledger.clone(),
        policies,
        env.gateway.clone(),
        cache,
        30,
        1000,
    );

    let outcome = trigger.check_and_trigger(env.user_id).await.unwrap();
    assert_eq!(outcome, TopupOutcome::NotNeeded);
    assert_eq!(env.gateway.charges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_declined_topup_surfaces_failed_and_keeps_debit() {
    let (env, policies) = env_with_policy(
        dec!(1.50),
        dec!(2.00),
        dec!(10.00),
        FakeGateway::declining(),
    );

    let cache = Arc::new(InMemoryCache::default());
    let trigger = TopupTrigger::new(
        env.ledger.clone(),
        policies,
        env.gateway.clone(),
        cache,
        30,
        1000,
    );

    env.ingest
        .process(event("c1", CallState::Completed, 45))
        .await
        .unwrap();

    let outcome = trigger.check_and_trigger(env.user_id).await.unwrap();
    assert!(matches!(outcome, TopupOutcome::Failed(_)));

    // The debit stands; only the credit is missing
    assert_eq!(env.balance(), dec!(1.40));
    assert_eq!(env.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_concurrent_triggers_produce_one_charge() {
    let (env, policies) = env_with_policy(
        dec!(1.00),
        dec!(2.00),
        dec!(10.00),
        FakeGateway::slow_approving(50),
    );

    let cache = Arc::new(InMemoryCache::default());
    let trigger = Arc::new(TopupTrigger::new(
        env.ledger.clone(),
        policies,
        env.gateway.clone(),
        cache,
        30,
        5000,
    ));

    let (a, b) = tokio::join!(
        trigger.check_and_trigger(env.user_id),
        trigger.check_and_trigger(env.user_id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let triggered = [&a, &b]
        .iter()
        .filter(|o| matches!(o, TopupOutcome::Triggered(_)))
        .count();
    let in_flight = [&a, &b]
        .iter()
        .filter(|o| matches!(o, TopupOutcome::AlreadyInFlight))
        .count();

    assert_eq!(triggered, 1, "exactly one trigger must win: {:?} {:?}", a, b);
    assert_eq!(in_flight, 1);
    assert_eq!(env.gateway.charges.load(Ordering::SeqCst), 1);
    assert_eq!(env.balance(), dec!(11.00));
}

#[tokio::test]
async fn test_marker_released_after_gateway_response() {
    let (env, policies) = env_with_policy(
        dec!(1.00),
        dec!(2.00),
        dec!(0.50),
        FakeGateway::approving(),
    );

    let cache = Arc::new(InMemoryCache::default());
    let trigger = TopupTrigger::new(
        env.ledger.clone(),
        policies,
        env.gateway.clone(),
        cache,
        30,
        1000,
    );

    // First top-up leaves the balance still under threshold; a second
    // sequential trigger must be able to acquire the marker again.
    let first = trigger.check_and_trigger(env.user_id).await.unwrap();
    assert_eq!(first, TopupOutcome::Triggered(dec!(0.50)));

    let second = trigger.check_and_trigger(env.user_id).await.unwrap();
    assert_eq!(second, TopupOutcome::Triggered(dec!(0.50)));

    assert_eq!(env.gateway.charges.load(Ordering::SeqCst), 2);
    assert_eq!(env.balance(), dec!(2.00));
}
