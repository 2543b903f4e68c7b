use super::{guard_stream, RawBody, RawResponse, SocketErrorKind, Transport, TransportError};
use async_trait::async_trait;
use futures::TryStreamExt;
use once_cell::sync::OnceCell;
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// `reqwest`-backed transport.
///
/// The async client is built eagerly; the blocking client is built on first synchronous use so
/// that purely async callers never spin up its background thread.
pub struct HttpTransport {
    client: reqwest::Client,
    blocking: OnceCell<reqwest::blocking::Client>,
    accept_invalid_certs: bool,
    proxy: Option<String>,
}

impl HttpTransport {
    pub fn new() -> crate::Result<Self> {
        let accept_invalid_certs = env::var("PRTG_ACCEPT_INVALID_CERTS").ok().as_deref() == Some("1");
        let proxy = env::var("PRTG_PROXY_URL").ok();
        Self::with_options(accept_invalid_certs, proxy)
    }

    pub fn with_options(accept_invalid_certs: bool, proxy: Option<String>) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("PRTG_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(8),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .danger_accept_invalid_certs(accept_invalid_certs);

        if let Some(proxy_url) = &proxy {
            if let Ok(p) = Proxy::all(proxy_url) {
                builder = builder.proxy(p);
            }
        }

        let client = builder.build().map_err(TransportError::Http)?;

        Ok(Self {
            client,
            blocking: OnceCell::new(),
            accept_invalid_certs,
            proxy,
        })
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        self.blocking.get_or_try_init(|| {
            let mut builder = reqwest::blocking::Client::builder()
                .danger_accept_invalid_certs(self.accept_invalid_certs);
            if let Some(proxy_url) = &self.proxy {
                if let Ok(p) = Proxy::all(proxy_url) {
                    builder = builder.proxy(p);
                }
            }
            builder.build().map_err(TransportError::Http)
        })
    }
}

/// Map a `reqwest` failure onto the transport taxonomy.
///
/// Socket causes are looked up through the source chain first: a refused or timed out connect
/// must stay distinguishable from the request timeout.
pub(crate) fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if let Some(kind) = socket_kind(&e) {
        return TransportError::Connect {
            kind,
            message: error_chain(&e),
        };
    }
    if e.is_timeout() {
        return TransportError::TimedOut;
    }
    if e.is_connect() {
        return TransportError::Connect {
            kind: SocketErrorKind::Other,
            message: error_chain(&e),
        };
    }
    TransportError::Http(e)
}

fn socket_kind(err: &(dyn std::error::Error + 'static)) -> Option<SocketErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return Some(SocketErrorKind::Refused),
                std::io::ErrorKind::TimedOut => return Some(SocketErrorKind::TimedOut),
                _ => {}
            }
        }
        current = e.source();
    }
    None
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        parts.push(e.to_string());
        current = e.source();
    }
    parts.join(": ")
}

#[async_trait]
impl Transport for HttpTransport {
    fn get_blocking(
        &self,
        url: &Url,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        if token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        super::blocking::exchange(self.blocking_client()?.clone(), url, timeout, token)
    }

    async fn get(
        &self,
        url: &Url,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let send = self.client.get(url.clone()).send();

        let resp = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TransportError::Cancelled),
            r = tokio::time::timeout(timeout, send) => match r {
                Err(_) => return Err(TransportError::TimedOut),
                Ok(r) => r.map_err(classify_reqwest_error)?,
            },
        };

        let status = resp.status().as_u16();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream().map_err(classify_reqwest_error);

        Ok(RawResponse {
            status,
            url: final_url,
            headers,
            body: RawBody::Stream(guard_stream(Box::pin(stream), timeout, token.clone())),
        })
    }
}
