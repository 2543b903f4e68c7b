//! Request execution: the blocking and async retry loops.
//!
//! One attempt is GET -> optional response hook -> classify -> log -> validate. A failed attempt
//! is classified and handed to `RetryPolicy::decide`; the two loops below only differ in how
//! they wait between attempts.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};
use url::Url;
use uuid::Uuid;

use super::core::{RequestEngine, ResponseHook};
use super::error_classification::AttemptFailure;
use super::policy::{redact, Decision};
use super::validation;
use crate::config::LogLevel;
use crate::events::{LogEvent, LogKind};
use crate::response::{classifier, Response};
use crate::transport::TransportError;
use crate::{Error, Result};

/// Granularity of the interruptible blocking backoff.
const WAIT_SLICE: Duration = Duration::from_millis(50);

impl RequestEngine {
    /// Caller token, else the engine default, else a token that never fires.
    pub(crate) fn effective_token(&self, token: Option<&CancellationToken>) -> CancellationToken {
        token
            .or(self.default_token.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn log_request(&self, url: &Url, mode: &str) {
        let message = format!("{} executing request {}", mode, redact(url));
        if self.config.log_level.contains(LogLevel::REQUEST) {
            info!("{}", message);
            self.events.on_log(&LogEvent {
                kind: LogKind::Request,
                message,
            });
        } else {
            debug!("{}", message);
        }
    }

    fn log_response(&self, response: &Response) {
        if !self.config.log_level.contains(LogLevel::RESPONSE) {
            return;
        }
        if let Some(text) = response.text() {
            debug!(status = response.status(), body = %text, "response");
            self.events.on_log(&LogEvent {
                kind: LogKind::Response,
                message: text.to_string(),
            });
        }
    }

    fn finish_attempt(&self, response: Response) -> Result<Response> {
        self.log_response(&response);
        if let Err(e) = validation::validate(&response) {
            info!(status = response.status(), error = %e, "server reported a failure");
            return Err(e);
        }
        Ok(response)
    }

    fn attempt_blocking(
        &self,
        url: &Url,
        token: &CancellationToken,
        hook: Option<&ResponseHook>,
    ) -> Result<Response> {
        let mut raw = self.transport.get_blocking(url, self.config.timeout(), token)?;
        if let Some(hook) = hook {
            hook(&mut raw);
        }
        let response = classifier::classify_blocking(raw, self.config.log_level, &self.dirty)?;
        self.finish_attempt(response)
    }

    /// The timeout and the caller's token cover the whole exchange, body included.
    async fn attempt(
        &self,
        url: &Url,
        token: &CancellationToken,
        hook: Option<&ResponseHook>,
    ) -> Result<Response> {
        let exchange = async {
            let mut raw = self.transport.get(url, self.config.timeout(), token).await?;
            if let Some(hook) = hook {
                hook(&mut raw);
            }
            classifier::classify(raw, self.config.log_level, &self.dirty).await
        };

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TransportError::Cancelled.into()),
            r = tokio::time::timeout(self.config.timeout(), exchange) => match r {
                Err(_) => return Err(TransportError::TimedOut.into()),
                Ok(r) => r?,
            },
        };
        self.finish_attempt(response)
    }

    /// Blocking retry loop for one logical request.
    pub(crate) fn run_blocking(
        &self,
        url: &Url,
        token: Option<&CancellationToken>,
        hook: Option<&ResponseHook>,
    ) -> Result<Response> {
        let token = self.effective_token(token);
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::debug_span!("prtg_request", request_id = %request_id);
        let _enter = span.enter();

        self.log_request(url, "Synchronously");
        let mut state = self.policy.start();

        loop {
            let err = match self.attempt_blocking(url, &token, hook) {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let failure = AttemptFailure::from_error(err, &token);
            match self.policy.decide(&mut state, failure, url, &request_id) {
                Decision::Fail(e) => return Err(e),
                Decision::Retry { delay, event } => {
                    self.events.on_retry(&event);
                    wait_blocking(delay, &token)?;
                }
            }
        }
    }

    /// Async retry loop for one logical request.
    pub(crate) async fn run(
        &self,
        url: &Url,
        token: Option<&CancellationToken>,
        hook: Option<&ResponseHook>,
    ) -> Result<Response> {
        let token = self.effective_token(token);
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::debug_span!("prtg_request", request_id = %request_id);

        async {
            self.log_request(url, "Asynchronously");
            let mut state = self.policy.start();

            loop {
                let err = match self.attempt(url, &token, hook).await {
                    Ok(response) => return Ok(response),
                    Err(e) => e,
                };

                let failure = AttemptFailure::from_error(err, &token);
                match self.policy.decide(&mut state, failure, url, &request_id) {
                    Decision::Fail(e) => return Err(e),
                    Decision::Retry { delay, event } => {
                        self.events.on_retry(&event);
                        wait(delay, &token).await?;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Sleep `delay` on the current thread, waking early if `token` fires.
fn wait_blocking(delay: Duration, token: &CancellationToken) -> Result<()> {
    let deadline = Instant::now() + delay;
    loop {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(WAIT_SLICE));
    }
}

async fn wait(delay: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
