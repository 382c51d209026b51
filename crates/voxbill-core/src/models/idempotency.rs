//! Idempotency event keys
//!
//! One write-once record exists per distinct inbound lifecycle event. The
//! event key is derived deterministically from the payload so that genuine
//! carrier retries collide while distinct events for the same call do not.

/// Result of an admit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First delivery of this event; side effects may run
    Admitted,
    /// The event was already processed; short-circuit without side effects
    AlreadyProcessed,
}

/// Derive the deterministic event key for a lifecycle event
///
/// Retries of the same logical event (same call, same status, same reported
/// duration) collide; distinct lifecycle events for the same call do not.
pub fn event_key(external_call_id: &str, status: &str, duration_seconds: i32) -> String {
    format!(
        "{}:{}:{}",
        external_call_id,
        status.to_lowercase(),
        duration_seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_collide() {
        assert_eq!(
            event_key("ext-1", "COMPLETED", 45),
            event_key("ext-1", "completed", 45)
        );
    }

    #[test]
    fn test_distinct_events_do_not_collide() {
        let ringing = event_key("ext-1", "ringing", 0);
        let completed = event_key("ext-1", "completed", 45);
        assert_ne!(ringing, completed);

        let other_call = event_key("ext-2", "completed", 45);
        assert_ne!(completed, other_call);
    }
}
