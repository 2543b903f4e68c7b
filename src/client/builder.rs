use crate::client::core::RequestEngine;
use crate::client::policy::RetryPolicy;
use crate::config::{EngineConfig, LogLevel};
use crate::error::ErrorContext;
use crate::events::EventSink;
use crate::request::{ConnectionDetails, PrtgUrlBuilder, UrlBuilder};
use crate::response::DirtyFlag;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for [`RequestEngine`].
///
/// Starts from [`EngineConfig::from_env`]; explicit setters win over the environment.
pub struct RequestEngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    events: Arc<dyn EventSink>,
    default_token: Option<CancellationToken>,
}

impl RequestEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::from_env(),
            transport: None,
            url_builder: None,
            events: crate::events::noop_sink(),
            default_token: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.config.retry_count = n;
        self
    }

    pub fn retry_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry_delay_secs = secs;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Use the standard PRTG URL layout for this server and credentials.
    pub fn connection(mut self, connection: ConnectionDetails) -> Self {
        self.url_builder = Some(Arc::new(PrtgUrlBuilder::new(connection)));
        self
    }

    pub fn url_builder(mut self, builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(builder);
        self
    }

    /// Inject a transport. Default is [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject an event sink. Default is a no-op sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Token used by calls that do not pass their own.
    pub fn default_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.default_token = Some(token);
        self
    }

    pub fn build(self) -> Result<RequestEngine> {
        if self.config.timeout_secs == 0 {
            return Err(Error::configuration(
                "timeout must be greater than zero",
                ErrorContext::new()
                    .with_source("engine_builder")
                    .with_details("timeout_secs = 0"),
            ));
        }

        let url_builder = self.url_builder.ok_or_else(|| {
            Error::configuration(
                "no connection details or URL builder configured",
                ErrorContext::new().with_source("engine_builder"),
            )
        })?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };

        let policy = RetryPolicy::new(self.config.retry_count, self.config.retry_delay());

        tracing::debug!(
            retry_count = self.config.retry_count,
            retry_delay_secs = self.config.retry_delay_secs,
            timeout_secs = self.config.timeout_secs,
            log_level = self.config.log_level.bits(),
            "request engine built"
        );

        Ok(RequestEngine {
            config: self.config,
            policy,
            transport,
            url_builder,
            events: self.events,
            dirty: DirtyFlag::new(),
            default_token: self.default_token,
        })
    }
}

impl Default for RequestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
