use crate::transport::TransportError;
use thiserror::Error;

/// Prefix shared by every message the server reports through an error body, error page or
/// inline error fragment.
pub const SERVER_ERROR_PREFIX: &str =
    "PRTG was unable to complete the request. The server responded with the following error: ";

/// Fixed message raised when the server rejects the supplied credentials.
pub const AUTHENTICATION_FAILED: &str =
    "Could not authenticate to PRTG; the specified username and password were invalid.";

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Request URL the error relates to
    pub url: Option<String>,
    /// HTTP status code, when a response was received
    pub status_code: Option<u16>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "url_builder", "engine_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            url: None,
            status_code: None,
            details: None,
            source: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Which server-side shape produced a [`RequestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// HTTP 400 with an `<error>` element in the body
    BadRequest,
    /// HTTP 401
    Unauthorized,
    /// Success status, but the request was redirected to `/error.htm`
    ErrorPage,
    /// Success status with an inline `<div class="errormsg">` fragment
    InlineError,
}

/// The uniform domain error raised for every failure the server reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub kind: RequestErrorKind,
    /// Human readable message extracted from the response
    pub message: String,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(RequestErrorKind::Unauthorized, AUTHENTICATION_FAILED)
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RequestErrorKind::Unauthorized => f.write_str(&self.message),
            _ => write!(f, "{}{}", SERVER_ERROR_PREFIX, self.message),
        }
    }
}

impl std::error::Error for RequestError {}

/// Unified error type for the request engine.
///
/// Callers see a domain failure as [`Error::Request`] regardless of the response shape it came
/// from; exhausted transient failures surface as [`Error::Timeout`], [`Error::Protocol`] or the
/// untouched [`Error::Transport`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Request(#[from] RequestError),

    #[error("Server responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("The operation was cancelled")]
    Cancelled,

    #[error("{message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("{message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid argument: {message}{}", format_context(.context))]
    InvalidArgument {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref url) = ctx.url {
        parts.push(format!("url: {}", url));
    }
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidArgument {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// The server-reported failure, if this is one.
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            Error::Request(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Transport(TransportError::Cancelled))
    }

    /// Whether this error belongs to the transient network taxonomy (timeouts, refused or
    /// dropped connections, generic transport failures).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Protocol { .. } => true,
            Error::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::InvalidArgument { context, .. } | Error::Configuration { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
