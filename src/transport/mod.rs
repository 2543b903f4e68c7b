//! Transport boundary: one HTTP GET per physical request.
//!
//! The engine never talks to `reqwest` directly. It drives a [`Transport`], which performs a
//! single exchange (blocking or async) and hands back a [`RawResponse`] whose body has not been
//! read yet. [`HttpTransport`] is the production implementation; tests plug in scripted ones.

mod blocking;
mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use std::io::Read;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Low-level socket failure classes the retry controller cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketErrorKind {
    Refused,
    TimedOut,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The cancellation token handed to the transport fired.
    #[error("The request was cancelled")]
    Cancelled,

    /// The per-request timeout elapsed before the server answered.
    #[error("The server timed out while executing request.")]
    TimedOut,

    #[error("Connection error: {message}")]
    Connect {
        kind: SocketErrorKind,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn refused(message: impl Into<String>) -> Self {
        TransportError::Connect {
            kind: SocketErrorKind::Refused,
            message: message.into(),
        }
    }

    pub fn socket_timeout(message: impl Into<String>) -> Self {
        TransportError::Connect {
            kind: SocketErrorKind::TimedOut,
            message: message.into(),
        }
    }

    /// The socket-level cause, if this failure has one.
    pub fn socket_kind(&self) -> Option<SocketErrorKind> {
        match self {
            TransportError::Connect { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::TimedOut | TransportError::Connect { .. } | TransportError::Http(_)
        )
    }
}

/// Chunked body of an async exchange.
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// Response body as delivered by the transport, not yet read.
pub enum RawBody {
    Bytes(Bytes),
    Reader(Box<dyn Read + Send>),
    Stream(BodyStream),
}

impl RawBody {
    pub fn empty() -> Self {
        RawBody::Bytes(Bytes::new())
    }

    /// Drain the body on the current thread.
    ///
    /// Async stream bodies are refused: they depend on the runtime that produced them.
    pub fn read_blocking(self) -> crate::Result<Bytes> {
        match self {
            RawBody::Bytes(b) => Ok(b),
            RawBody::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(transport_or_io)?;
                Ok(Bytes::from(buf))
            }
            RawBody::Stream(_) => Err(TransportError::Other(
                "an async response body cannot be read synchronously".into(),
            )
            .into()),
        }
    }

    /// Drain the body without blocking the executor.
    pub async fn read(self) -> crate::Result<Bytes> {
        match self {
            RawBody::Bytes(b) => Ok(b),
            RawBody::Stream(stream) => collect_stream(stream).await,
            RawBody::Reader(mut reader) => {
                let read = tokio::task::spawn_blocking(move || {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).map(|_| Bytes::from(buf))
                })
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?;
                read.map_err(transport_or_io)
            }
        }
    }
}

/// Recover the [`TransportError`] a body reader wrapped into an `io::Error`.
pub(crate) fn transport_or_io(e: std::io::Error) -> crate::Error {
    if !e
        .get_ref()
        .map_or(false, |inner| inner.is::<TransportError>())
    {
        return crate::Error::Io(e);
    }
    match e.into_inner().map(|inner| inner.downcast::<TransportError>()) {
        Some(Ok(te)) => crate::Error::Transport(*te),
        _ => crate::Error::Transport(TransportError::Other("unreadable response body".into())),
    }
}

/// Bound the wait for each chunk of `stream` by `idle` and end it when `token` fires.
///
/// The first error ends the stream.
pub(crate) fn guard_stream(stream: BodyStream, idle: Duration, token: CancellationToken) -> BodyStream {
    futures::stream::unfold(Some((stream, token)), move |state| async move {
        let (mut stream, token) = state?;
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => Some(Err(TransportError::Cancelled)),
            r = tokio::time::timeout(idle, stream.next()) => {
                r.unwrap_or(Some(Err(TransportError::TimedOut)))
            }
        };
        match next? {
            Ok(chunk) => Some((Ok(chunk), Some((stream, token)))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

async fn collect_stream(stream: BodyStream) -> crate::Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

impl std::fmt::Debug for RawBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RawBody::Reader(_) => f.write_str("Reader"),
            RawBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One completed HTTP exchange.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    /// Final request URL, after any redirects were followed
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RawBody,
}

impl RawResponse {
    pub fn new(status: u16, url: Url, body: RawBody) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        if let Ok(value) = content_type.parse() {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Performs a single HTTP GET.
///
/// Implementations must honor `token` by returning [`TransportError::Cancelled`] and `timeout`
/// by returning [`TransportError::TimedOut`], while waiting for the response and while its body
/// is read. Retries are not the transport's business.
#[async_trait]
pub trait Transport: Send + Sync {
    fn get_blocking(
        &self,
        url: &Url,
        timeout: Duration,
        token: &CancellationToken,
    ) -> std::result::Result<RawResponse, TransportError>;

    async fn get(
        &self,
        url: &Url,
        timeout: Duration,
        token: &CancellationToken,
    ) -> std::result::Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_blocking_drains_reader_and_refuses_streams() {
        let reader = RawBody::Reader(Box::new(std::io::Cursor::new(b"<prtg/>".to_vec())));
        assert_eq!(&reader.read_blocking().unwrap()[..], b"<prtg/>");

        let chunks = futures::stream::iter(vec![Ok::<_, TransportError>(Bytes::from_static(b"<a>"))]);
        let err = RawBody::Stream(Box::pin(chunks)).read_blocking().unwrap_err();
        assert!(matches!(err, crate::Error::Transport(TransportError::Other(_))));
    }

    #[test]
    fn test_reader_failure_keeps_transport_error() {
        let wrapped = std::io::Error::new(std::io::ErrorKind::Other, TransportError::TimedOut);
        assert!(matches!(
            transport_or_io(wrapped),
            crate::Error::Transport(TransportError::TimedOut)
        ));
        let plain = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(matches!(transport_or_io(plain), crate::Error::Io(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_stream_times_out_when_stalled() {
        let stalled = futures::stream::once(async { Ok(Bytes::from_static(b"<p>")) })
            .chain(futures::stream::pending())
            .boxed();
        let mut guarded = guard_stream(stalled, Duration::from_secs(2), CancellationToken::new());

        assert_eq!(&guarded.next().await.unwrap().unwrap()[..], b"<p>");
        assert!(matches!(guarded.next().await, Some(Err(TransportError::TimedOut))));
        assert!(guarded.next().await.is_none());
    }

    #[tokio::test]
    async fn test_guarded_stream_stops_on_cancel() {
        let token = CancellationToken::new();
        let stalled = futures::stream::pending::<std::result::Result<Bytes, TransportError>>().boxed();
        let mut guarded = guard_stream(stalled, Duration::from_secs(60), token.clone());
        token.cancel();
        assert!(matches!(guarded.next().await, Some(Err(TransportError::Cancelled))));
        assert!(guarded.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_error_surfaces_as_transport_error() {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"<a>")),
            Err(TransportError::Other("connection closed".into())),
        ]);
        let err = RawBody::Stream(Box::pin(chunks)).read().await.unwrap_err();
        assert!(matches!(err, crate::Error::Transport(TransportError::Other(_))));
    }

    #[test]
    fn test_content_type_and_status() {
        let url = Url::parse("https://prtg.example.com/api/table.xml").unwrap();
        let raw = RawResponse::new(204, url, RawBody::empty()).with_content_type("text/csv");
        assert!(raw.is_success());
        assert_eq!(raw.content_type(), Some("text/csv"));
        assert!(TransportError::refused("x").is_retryable());
        assert_eq!(TransportError::socket_timeout("x").socket_kind(), Some(SocketErrorKind::TimedOut));
        assert!(!TransportError::Other("x".into()).is_retryable());
    }
}
