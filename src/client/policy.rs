use super::error_classification::AttemptFailure;
use crate::events::RetryRequestEvent;
use crate::transport::{SocketErrorKind, TransportError};
use crate::Error;
use std::time::Duration;
use url::Url;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug)]
pub(crate) enum Decision {
    /// Notify observers with `event`, wait `delay`, then try again.
    Retry {
        delay: Duration,
        event: RetryRequestEvent,
    },
    Fail(Error),
}

/// Retry bookkeeping for one logical request (one call, or one chunk of a batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryState {
    pub retries_remaining: u32,
    pub attempts_made: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retries_remaining: max_retries,
            attempts_made: 0,
        }
    }
}

/// Linear backoff retry controller shared by the blocking and async loops.
///
/// The loops only differ in how they wait; every decision is taken here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub delay_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay_unit: Duration) -> Self {
        Self {
            max_retries,
            delay_unit,
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState::new(self.max_retries)
    }

    /// Wait before retry number `attempt` (1-based): `delay_unit * attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay_unit.saturating_mul(attempt)
    }

    /// Decide what to do next after an attempt failed.
    pub fn decide(
        &self,
        state: &mut RetryState,
        failure: AttemptFailure,
        url: &Url,
        request_id: &str,
    ) -> Decision {
        state.attempts_made = state.attempts_made.saturating_add(1);

        if !failure.is_retryable() {
            return match failure {
                AttemptFailure::Fatal(e) => Decision::Fail(e),
                _ => Decision::Fail(Error::Cancelled),
            };
        }

        if state.retries_remaining == 0 {
            tracing::warn!(
                url = %redact(url),
                attempts = state.attempts_made,
                error = %failure,
                "retries exhausted"
            );
            return Decision::Fail(exhausted(failure, url));
        }

        let delay = self.backoff(state.attempts_made);
        let event = RetryRequestEvent {
            error: failure.to_string(),
            url: url.to_string(),
            retries_remaining: state.retries_remaining,
            request_id: request_id.to_string(),
        };
        tracing::warn!(
            url = %redact(url),
            retries_remaining = state.retries_remaining,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "request failed, retrying"
        );
        state.retries_remaining -= 1;

        Decision::Retry { delay, event }
    }
}

/// Final error once retries run out.
///
/// Refused and timed out connections are translated into messages naming the scheme and port.
/// Other socket failures and failures with no socket cause are returned unchanged.
fn exhausted(failure: AttemptFailure, url: &Url) -> Error {
    let scheme = url.scheme().to_uppercase();
    let port = url
        .port_or_known_default()
        .map(|p| p.to_string())
        .unwrap_or_default();

    match failure {
        AttemptFailure::Socket(SocketErrorKind::TimedOut, e) => Error::Timeout {
            message: format!(
                "Connection timed out while communicating with remote server via {} on port {}. Confirm server address and port are valid and PRTG Service is running",
                scheme, port
            ),
            source: Some(e),
        },
        AttemptFailure::Socket(SocketErrorKind::Refused, e) => Error::Protocol {
            message: format!(
                "Server rejected {} connection on port {}. Please confirm expected server protocol and port, PRTG Core Service is running and that any SSL certificate is trusted",
                scheme, port
            ),
            source: Some(e),
        },
        AttemptFailure::Timeout(e) => Error::Timeout {
            message: TransportError::TimedOut.to_string(),
            source: Some(e),
        },
        AttemptFailure::Socket(SocketErrorKind::Other, e) | AttemptFailure::Transport(e) => {
            Error::Transport(e)
        }
        AttemptFailure::Cancelled => Error::Cancelled,
        AttemptFailure::Fatal(e) => e,
    }
}

/// URL with the `passhash` value masked, for logs.
pub(crate) fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "passhash") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "passhash" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
