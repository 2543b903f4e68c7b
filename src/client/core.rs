use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::policy::RetryPolicy;
use crate::batch::{chunk_ranges, ObjectIdsGuard, BATCH_LIMIT};
use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::request::{MultiTargetParameters, RequestParameters, UrlBuilder};
use crate::response::{DirtyFlag, Response};
use crate::transport::{RawResponse, Transport};
use crate::Result;

/// Inspects or rewrites a raw response before it is classified and validated.
pub type ResponseHook = dyn Fn(&mut RawResponse) + Send + Sync;

/// Resilient request engine for the PRTG HTTP API.
///
/// Turns request descriptors into URLs, issues them with retry and backoff, classifies each
/// response as text or stream and converts every server-reported failure into
/// [`crate::Error::Request`]. Blocking and async entry points share the same semantics.
///
/// One engine is one session: the dirty flag raised by any response applies to every later
/// call made through it.
pub struct RequestEngine {
    pub(crate) config: EngineConfig,
    pub(crate) policy: RetryPolicy,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) url_builder: Arc<dyn UrlBuilder>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) dirty: DirtyFlag,
    pub(crate) default_token: Option<CancellationToken>,
}

impl RequestEngine {
    pub fn builder() -> super::RequestEngineBuilder {
        super::RequestEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether unsafe content has been seen in this session.
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    /// Force buffered text handling for every later response.
    pub fn mark_dirty(&self) {
        if self.dirty.set() {
            debug!("session marked dirty");
        }
    }

    /// Handle to the session dirty flag.
    pub fn dirty_flag(&self) -> DirtyFlag {
        self.dirty.clone()
    }

    /// Execute one request, blocking the current thread.
    ///
    /// Must not be called from within an async runtime when the default HTTP transport is used.
    pub fn execute(
        &self,
        params: &dyn RequestParameters,
        token: Option<&CancellationToken>,
    ) -> Result<Response> {
        let url = self.url_builder.build_url(params)?;
        self.run_blocking(&url, token, None)
    }

    pub async fn execute_async(
        &self,
        params: &dyn RequestParameters,
        token: Option<&CancellationToken>,
    ) -> Result<Response> {
        let url = self.url_builder.build_url(params)?;
        self.run(&url, token, None).await
    }

    /// Like [`execute`](Self::execute), running `hook` on every raw response before validation.
    pub fn execute_with_hook(
        &self,
        params: &dyn RequestParameters,
        hook: &ResponseHook,
        token: Option<&CancellationToken>,
    ) -> Result<Response> {
        let url = self.url_builder.build_url(params)?;
        self.run_blocking(&url, token, Some(hook))
    }

    pub async fn execute_with_hook_async(
        &self,
        params: &dyn RequestParameters,
        hook: &ResponseHook,
        token: Option<&CancellationToken>,
    ) -> Result<Response> {
        let url = self.url_builder.build_url(params)?;
        self.run(&url, token, Some(hook)).await
    }

    /// Execute a request for a URL that was built elsewhere.
    pub fn execute_url(&self, url: &Url, token: Option<&CancellationToken>) -> Result<Response> {
        self.run_blocking(url, token, None)
    }

    pub async fn execute_url_async(
        &self,
        url: &Url,
        token: Option<&CancellationToken>,
    ) -> Result<Response> {
        self.run(url, token, None).await
    }

    /// Execute a multi-target command, one request per [`BATCH_LIMIT`] object ids.
    ///
    /// Chunks run sequentially and each has its own retry budget. The first failing chunk
    /// aborts the rest; earlier chunks are not rolled back. `params` always ends up with its
    /// original id list.
    pub fn execute_multi<P>(&self, params: &mut P, token: Option<&CancellationToken>) -> Result<()>
    where
        P: MultiTargetParameters,
    {
        let mut guard = ObjectIdsGuard::new(params);
        let total = guard.original().len();

        for (index, range) in chunk_ranges(total, BATCH_LIMIT).enumerate() {
            debug!(chunk = index, ids = range.len(), total, "executing batch chunk");
            guard.install(range);
            let url = self.url_builder.build_url(&*guard)?;
            self.run_blocking(&url, token, None)?;
        }
        Ok(())
    }

    pub async fn execute_multi_async<P>(
        &self,
        params: &mut P,
        token: Option<&CancellationToken>,
    ) -> Result<()>
    where
        P: MultiTargetParameters,
    {
        let mut guard = ObjectIdsGuard::new(params);
        let total = guard.original().len();

        for (index, range) in chunk_ranges(total, BATCH_LIMIT).enumerate() {
            debug!(chunk = index, ids = range.len(), total, "executing batch chunk");
            guard.install(range);
            let url = self.url_builder.build_url(&*guard)?;
            self.run(&url, token, None).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RequestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEngine")
            .field("config", &self.config)
            .field("dirty", &self.dirty.is_set())
            .finish_non_exhaustive()
    }
}
