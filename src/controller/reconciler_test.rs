//! Tests for the reconciler module
//!
//! These tests verify how pass outcomes are turned into redelivery:
//! - Successful passes wait for the next change
//! - Not-ready failures come back sooner than other failures

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::reconciler::*;
    use crate::error::{Error, PassOutcome};

    #[test]
    fn test_successful_pass_is_not_requeued() {
        assert_eq!(requeue_delay(&PassOutcome::Done), None);
    }

    #[test]
    fn test_not_ready_requeues_sooner_than_fatal() {
        let retry = requeue_delay(&Error::not_ready("ports bound").failure().into()).unwrap();
        let fatal = requeue_delay(&Error::provider("HTTP 500").failure().into()).unwrap();

        assert_eq!(retry, Duration::from_secs(15));
        assert_eq!(fatal, Duration::from_secs(60));
        assert!(retry < fatal);
    }

    #[test]
    fn test_propagation_failure_is_fatal() {
        let err = Error::PropagationError {
            failed: vec!["default/web: lb busy".to_string()],
        };
        assert!(matches!(
            PassOutcome::from(err.failure()),
            PassOutcome::Fatal(_)
        ));
    }
}
