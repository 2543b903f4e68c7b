//! # prtg-request
//!
//! Resilient request engine for the PRTG HTTP API.
//!
//! ## Overview
//!
//! Every call made by a PRTG client library funnels through one engine that turns a request
//! descriptor into a URL, issues it over HTTP with retry and linear backoff, decides whether the
//! response is buffered as text or handed out as a stream, and converts every failure shape the
//! server uses into one uniform error.
//!
//! ## Key Features
//!
//! - **Blocking and async**: [`RequestEngine::execute`] and [`RequestEngine::execute_async`]
//!   have identical semantics
//! - **Retry**: transient network failures are retried `retry_count` times, waiting
//!   `retry_delay × attempt` between attempts; cancellation is never retried
//! - **Batching**: multi-target commands are split into chunks of [`batch::BATCH_LIMIT`] ids
//! - **Dirty sessions**: once a response with unsafe content is seen, every later response is
//!   buffered ([`RequestEngine::is_dirty`])
//! - **Uniform errors**: error bodies, 401s, error page redirects and inline error fragments all
//!   surface as [`Error::Request`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prtg_request::{ConnectionDetails, Parameters, RequestEngine};
//!
//! #[tokio::main]
//! async fn main() -> prtg_request::Result<()> {
//!     let engine = RequestEngine::builder()
//!         .connection(ConnectionDetails::new("prtg.example.com", "prtgadmin", "12345678")?)
//!         .retry_count(2)
//!         .build()?;
//!
//!     let params = Parameters::new("api/table.xml").with("content", "sensors");
//!     let response = engine.execute_async(&params, None).await?;
//!     println!("{}", response.into_text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | The engine, its builder, retry loops and response validation |
//! | [`request`] | Request descriptors and URL building |
//! | [`transport`] | HTTP transport boundary |
//! | [`response`] | Response envelope, streams and the text/stream classifier |
//! | [`batch`] | Batch splitting for multi-target commands |
//! | [`config`] | Engine configuration |
//! | [`events`] | Observer hooks |

pub mod batch;
pub mod client;
pub mod config;
pub mod events;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{RequestEngine, RequestEngineBuilder, ResponseHook};
pub use config::{EngineConfig, LogLevel};
pub use events::{EventSink, InMemoryEventSink, LogEvent, LogKind, RetryRequestEvent};
pub use request::{
    CommandParameters, ConnectionDetails, MultiTargetParameters, Parameters, PrtgUrlBuilder,
    RequestParameters, UrlBuilder,
};
pub use response::{DirtyFlag, Response, ResponseBody, ResponseKind, ResponseStream};
pub use transport::{HttpTransport, RawBody, RawResponse, SocketErrorKind, Transport, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, RequestError, RequestErrorKind};
