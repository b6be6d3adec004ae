//! Retry loop: run a closure until success, a final error, or a control signal.

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::ControlToken;

/// Runs `f` until it succeeds or the retry policy says to stop.
///
/// `f` receives the 1-based attempt number. Backoff sleeps are sliced so a
/// pause or cancel on `token` ends the loop early with
/// `TransferError::Interrupted`. An `Interrupted` error from `f` is returned
/// as is, without consulting the policy.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    token: &ControlToken,
    mut f: F,
) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(TransferError::Interrupted(signal)) => {
                return Err(TransferError::Interrupted(signal))
            }
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = d.as_millis() as u64,
                            error = %e,
                            "transient failure, backing off"
                        );
                        if let Some(signal) = token.sleep(d) {
                            return Err(TransferError::Interrupted(signal));
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlSignal;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let token = ControlToken::new();
        let mut calls = 0;
        let out = run_with_retry(&fast_policy(), &token, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(TransferError::Http(503))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let token = ControlToken::new();
        let mut calls = 0;
        let out: Result<(), _> = run_with_retry(&fast_policy(), &token, |_| {
            calls += 1;
            Err(TransferError::Http(500))
        });
        assert!(matches!(out, Err(TransferError::Http(500))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let token = ControlToken::new();
        let mut calls = 0;
        let out: Result<(), _> = run_with_retry(&fast_policy(), &token, |_| {
            calls += 1;
            Err(TransferError::Http(404))
        });
        assert!(matches!(out, Err(TransferError::Http(404))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn signal_during_backoff_interrupts() {
        let token = ControlToken::new();
        token.request(ControlSignal::Pause);
        let out: Result<(), _> = run_with_retry(&fast_policy(), &token, |_| {
            Err(TransferError::Http(503))
        });
        assert!(matches!(
            out,
            Err(TransferError::Interrupted(ControlSignal::Pause))
        ));
    }
}
