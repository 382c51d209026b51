//! Call model and lifecycle state machine
//!
//! A call record is created when a call is initiated and mutated only through
//! `apply_transition` in response to carrier lifecycle events. Records are
//! never deleted; terminal states are final and the cost is written exactly
//! once, at the transition into a terminal state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call lifecycle state
///
/// The happy path is `Initiated → Ringing → Answered → Completed`.
/// `Failed`, `Cancelled` and `NoAnswer` are the terminal side branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Initiated,
    Ringing,
    Answered,
    Completed,
    Failed,
    Cancelled,
    NoAnswer,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Initiated => write!(f, "initiated"),
            CallState::Ringing => write!(f, "ringing"),
            CallState::Answered => write!(f, "answered"),
            CallState::Completed => write!(f, "completed"),
            CallState::Failed => write!(f, "failed"),
            CallState::Cancelled => write!(f, "cancelled"),
            CallState::NoAnswer => write!(f, "no_answer"),
        }
    }
}

impl CallState {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallState::Initiated),
            "ringing" => Some(CallState::Ringing),
            "answered" => Some(CallState::Answered),
            "completed" => Some(CallState::Completed),
            "failed" => Some(CallState::Failed),
            "cancelled" | "canceled" => Some(CallState::Cancelled),
            "no_answer" | "no-answer" => Some(CallState::NoAnswer),
            _ => None,
        }
    }

    /// Check if this state is terminal (no further cost-affecting transitions)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed | CallState::Cancelled | CallState::NoAnswer
        )
    }

    /// Check whether a transition to `next` is allowed
    ///
    /// The table coalesces forward: a lost intermediate webhook (e.g.
    /// `COMPLETED` arriving while still `Initiated`) must not strand a
    /// chargeable event. Backward transitions and anything out of a terminal
    /// state are rejected.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;

        match self {
            Initiated => matches!(next, Ringing | Answered | Completed | Failed | Cancelled),
            Ringing => matches!(next, Answered | Completed | Failed | Cancelled | NoAnswer),
            Answered => matches!(next, Completed | Failed),
            Completed | Failed | Cancelled | NoAnswer => false,
        }
    }
}

/// Outcome of applying a lifecycle event to a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The transition was applied; `entered_terminal` signals that billing
    /// finalization must now run.
    Applied { entered_terminal: bool },
    /// The transition was rejected; the call is unchanged. Rejections are
    /// acknowledged as no-ops, not errors.
    Rejected { reason: String },
}

impl Transition {
    /// Check if the transition was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Call entity
///
/// One outbound/inbound call attempt, keyed by the carrier-assigned
/// `external_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Unique identifier
    pub id: Uuid,

    /// Carrier-assigned session id (unique)
    pub external_call_id: String,

    /// Caller number
    pub origin_number: String,

    /// Called number
    pub destination_number: String,

    /// Destination country/rate code
    pub destination_country: Option<String>,

    /// Caller-identity country, used to scope rate lookup
    pub origin_country: Option<String>,

    /// Current lifecycle state
    pub state: CallState,

    /// Elapsed duration in seconds as last reported by the carrier
    pub duration_seconds: i32,

    /// Final cost; set exactly once at the terminal transition
    pub cost: Option<Decimal>,

    /// Set when the call finalized without an authoritative rate and needs
    /// manual review (distinct from a legitimately free call)
    pub flagged_for_audit: bool,

    /// Owning user; None for synthesized calls whose owner could not be
    /// resolved
    pub owner_user_id: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the call reached a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    /// Apply a carrier lifecycle event to this call
    ///
    /// The reported duration only ever grows; carriers may repeat a smaller
    /// elapsed value on stale retries.
    pub fn apply_transition(
        &mut self,
        new_state: CallState,
        observed_duration: i32,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.state.is_terminal() {
            return Transition::Rejected {
                reason: format!(
                    "call {} is already {} (terminal)",
                    self.external_call_id, self.state
                ),
            };
        }

        if !self.state.can_transition_to(new_state) {
            return Transition::Rejected {
                reason: format!(
                    "transition {} -> {} is not allowed for call {}",
                    self.state, new_state, self.external_call_id
                ),
            };
        }

        self.state = new_state;
        self.duration_seconds = self.duration_seconds.max(observed_duration.max(0));

        let entered_terminal = new_state.is_terminal();
        if entered_terminal {
            self.ended_at = Some(now);
        }

        Transition::Applied { entered_terminal }
    }

    /// Synthesize a call record from an event with no prior record
    ///
    /// Best-effort recovery: losing a webhook must not silently lose a
    /// chargeable event, so the record starts directly in the observed state.
    pub fn synthesize(
        external_call_id: String,
        origin_number: String,
        destination_number: String,
        destination_country: Option<String>,
        state: CallState,
        duration_seconds: i32,
        owner_user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_call_id,
            origin_number,
            destination_number,
            destination_country,
            origin_country: None,
            state,
            duration_seconds: duration_seconds.max(0),
            cost: None,
            // A synthesized call with no resolvable owner cannot be billed
            flagged_for_audit: owner_user_id.is_none(),
            owner_user_id,
            created_at: now,
            ended_at: if state.is_terminal() { Some(now) } else { None },
        }
    }

    /// Check if the call requires cost computation
    #[inline]
    pub fn is_billable(&self) -> bool {
        self.state.is_terminal() && self.duration_seconds > 0
    }

    /// Record the final cost
    ///
    /// The cost is written exactly once; later writes are ignored and
    /// reported as `false`.
    pub fn finalize_cost(&mut self, cost: Decimal) -> bool {
        if self.cost.is_some() {
            return false;
        }
        self.cost = Some(cost);
        true
    }
}

impl Default for Call {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_call_id: Uuid::new_v4().to_string(),
            origin_number: String::new(),
            destination_number: String::new(),
            destination_country: None,
            origin_country: None,
            state: CallState::Initiated,
            duration_seconds: 0,
            cost: None,
            flagged_for_audit: false,
            owner_user_id: None,
            created_at: now,
            ended_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_happy_path_transitions() {
        let mut call = Call::default();

        assert!(call
            .apply_transition(CallState::Ringing, 0, Utc::now())
            .is_applied());
        assert!(call
            .apply_transition(CallState::Answered, 0, Utc::now())
            .is_applied());

        let t = call.apply_transition(CallState::Completed, 45, Utc::now());
        assert_eq!(t, Transition::Applied { entered_terminal: true });
        assert_eq!(call.state, CallState::Completed);
        assert_eq!(call.duration_seconds, 45);
        assert!(call.ended_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut call = Call::default();
        call.apply_transition(CallState::Completed, 60, Utc::now());

        // A late FAILED event cannot un-complete the call
        let t = call.apply_transition(CallState::Failed, 0, Utc::now());
        assert!(!t.is_applied());
        assert_eq!(call.state, CallState::Completed);
        assert_eq!(call.duration_seconds, 60);

        // Neither can a late RINGING
        let t = call.apply_transition(CallState::Ringing, 0, Utc::now());
        assert!(!t.is_applied());
        assert_eq!(call.state, CallState::Completed);
    }

    #[test]
    fn test_forward_coalescing() {
        // COMPLETED arriving while still Initiated (lost ANSWERED webhook)
        let mut call = Call::default();
        let t = call.apply_transition(CallState::Completed, 30, Utc::now());
        assert_eq!(t, Transition::Applied { entered_terminal: true });
    }

    #[test]
    fn test_no_answer_only_after_ringing() {
        let mut call = Call::default();
        let t = call.apply_transition(CallState::NoAnswer, 0, Utc::now());
        assert!(!t.is_applied());

        call.apply_transition(CallState::Ringing, 0, Utc::now());
        let t = call.apply_transition(CallState::NoAnswer, 0, Utc::now());
        assert!(t.is_applied());
        assert_eq!(call.state, CallState::NoAnswer);
    }

    #[test]
    fn test_answered_call_can_fail() {
        // Answered then dropped mid-billing: duration survives for costing
        let mut call = Call::default();
        call.apply_transition(CallState::Answered, 0, Utc::now());
        let t = call.apply_transition(CallState::Failed, 12, Utc::now());
        assert_eq!(t, Transition::Applied { entered_terminal: true });
        assert!(call.is_billable());
    }

    #[test]
    fn test_duration_never_shrinks() {
        let mut call = Call::default();
        call.apply_transition(CallState::Answered, 20, Utc::now());
        call.apply_transition(CallState::Completed, 10, Utc::now());
        assert_eq!(call.duration_seconds, 20);
    }

    #[test]
    fn test_cost_set_exactly_once() {
        let mut call = Call::default();
        assert!(call.finalize_cost(dec!(0.10)));
        assert!(!call.finalize_cost(dec!(0.20)));
        assert_eq!(call.cost, Some(dec!(0.10)));
    }

    #[test]
    fn test_synthesize_without_owner_flags_audit() {
        let call = Call::synthesize(
            "ext-1".to_string(),
            "15551234567".to_string(),
            "51999888777".to_string(),
            Some("51".to_string()),
            CallState::Completed,
            45,
            None,
            Utc::now(),
        );

        assert_eq!(call.state, CallState::Completed);
        assert!(call.flagged_for_audit);
        assert!(call.ended_at.is_some());
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(CallState::from_str("COMPLETED"), Some(CallState::Completed));
        assert_eq!(CallState::from_str("no-answer"), Some(CallState::NoAnswer));
        assert_eq!(CallState::from_str("ringing"), Some(CallState::Ringing));
        assert_eq!(CallState::from_str("unknown"), None);
    }
}
