//! Failure classification for a single attempt.

use crate::transport::{SocketErrorKind, TransportError};
use crate::Error;
use tokio_util::sync::CancellationToken;

/// Why an attempt failed, as far as the retry controller is concerned.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    /// The caller's token fired. Never retried.
    Cancelled,
    /// The engine's own timeout elapsed.
    Timeout(TransportError),
    /// The connection itself failed.
    Socket(SocketErrorKind, TransportError),
    /// Any other HTTP transport failure.
    Transport(TransportError),
    /// Not a transient failure; returned to the caller as is.
    Fatal(Error),
}

impl AttemptFailure {
    /// Classify `err` against the caller's token.
    ///
    /// Cancellation is reported by the transport the same way whether the caller or an
    /// internal deadline triggered it; only the state of `token` tells them apart, and it takes
    /// priority over every other transport failure. Errors the server reported stay as they are.
    pub(crate) fn from_error(err: Error, token: &CancellationToken) -> Self {
        match err {
            Error::Cancelled | Error::Transport(_) if token.is_cancelled() => AttemptFailure::Cancelled,
            Error::Cancelled => AttemptFailure::Timeout(TransportError::TimedOut),
            Error::Transport(te) => Self::from_transport(te),
            other => AttemptFailure::Fatal(other),
        }
    }

    fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled | TransportError::TimedOut => {
                AttemptFailure::Timeout(TransportError::TimedOut)
            }
            TransportError::Connect { kind, .. } => AttemptFailure::Socket(kind, err),
            TransportError::Http(_) => AttemptFailure::Transport(err),
            TransportError::Other(_) => AttemptFailure::Fatal(Error::Transport(err)),
        }
    }

    pub(crate) fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttemptFailure::Timeout(_) | AttemptFailure::Socket(..) | AttemptFailure::Transport(_)
        )
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Cancelled => f.write_str("The operation was cancelled"),
            AttemptFailure::Timeout(e)
            | AttemptFailure::Socket(_, e)
            | AttemptFailure::Transport(e) => write!(f, "{}", e),
            AttemptFailure::Fatal(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;

    #[test]
    fn test_caller_cancellation_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let failure = AttemptFailure::from_error(Error::Transport(TransportError::TimedOut), &token);
        assert!(matches!(failure, AttemptFailure::Cancelled));
        assert!(!failure.is_retryable());
    }

    #[test]
    fn test_internal_cancellation_is_a_timeout() {
        let token = CancellationToken::new();
        let failure = AttemptFailure::from_error(Error::Transport(TransportError::Cancelled), &token);
        assert!(matches!(failure, AttemptFailure::Timeout(_)));
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_socket_and_other_failures() {
        let token = CancellationToken::new();
        assert!(matches!(
            AttemptFailure::from_error(Error::Transport(TransportError::refused("refused")), &token),
            AttemptFailure::Socket(SocketErrorKind::Refused, _)
        ));
        assert!(matches!(
            AttemptFailure::from_error(Error::Transport(TransportError::Other("x".into())), &token),
            AttemptFailure::Fatal(_)
        ));
        let domain = AttemptFailure::from_error(Error::Request(RequestError::unauthorized()), &token);
        assert!(matches!(domain, AttemptFailure::Fatal(Error::Request(_))));
        assert!(!domain.is_retryable());
    }

    #[test]
    fn test_server_error_survives_late_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let failure = AttemptFailure::from_error(Error::Request(RequestError::unauthorized()), &token);
        assert!(matches!(failure, AttemptFailure::Fatal(Error::Request(_))));
    }
}
