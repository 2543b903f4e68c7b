//! Shared fixtures: a scripted in-memory transport and engine helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use prtg_request::{
    ConnectionDetails, EngineConfig, EventSink, InMemoryEventSink, LogLevel, RawBody, RawResponse,
    RequestEngine, Transport, TransportError,
};
use std::collections::VecDeque;
use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Canned successful or failing HTTP exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
    pub final_url: Option<String>,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            content_type: Some("text/xml; charset=utf-8"),
            body: body.as_bytes().to_vec(),
            final_url: None,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn bytes(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn final_url(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Reply(Reply),
    Fail(fn() -> TransportError),
    /// Cancel the caller's token, then report the cancellation like a real transport would.
    CancelCaller,
    /// Headers of a `200 text/html` reply and the first bytes of its body, then nothing.
    /// Async only.
    StallBody(&'static [u8]),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: Url,
    pub at: tokio::time::Instant,
}

/// Transport that plays back a script, then repeats `otherwise` forever.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    otherwise: Step,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_fallback(steps, Step::Reply(Reply::ok("<prtg/>")))
    }

    pub fn with_fallback(steps: Vec<Step>, otherwise: Step) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            otherwise,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        self.calls()
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }

    fn play(&self, url: &Url, token: &CancellationToken) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            url: url.clone(),
            at: tokio::time::Instant::now(),
        });
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        match step {
            Step::Reply(reply) => {
                let final_url = match &reply.final_url {
                    Some(u) => Url::parse(u).unwrap(),
                    None => url.clone(),
                };
                let raw = RawResponse::new(reply.status, final_url, RawBody::Bytes(Bytes::from(reply.body)));
                Ok(match reply.content_type {
                    Some(ct) => raw.with_content_type(ct),
                    None => raw,
                })
            }
            Step::Fail(make) => Err(make()),
            Step::CancelCaller => {
                token.cancel();
                Err(TransportError::Cancelled)
            }
            Step::StallBody(prefix) => {
                let body = stream::once(async move { Ok(Bytes::from_static(prefix)) })
                    .chain(stream::pending())
                    .boxed();
                Ok(RawResponse::new(200, url.clone(), RawBody::Stream(body)).with_content_type("text/html"))
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn get_blocking(
        &self,
        url: &Url,
        _timeout: Duration,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.play(url, token)
    }

    async fn get(
        &self,
        url: &Url,
        _timeout: Duration,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.play(url, token)
    }
}

pub fn refused() -> TransportError {
    TransportError::refused("Connection refused (os error 111)")
}

pub fn socket_timeout() -> TransportError {
    TransportError::socket_timeout("Connection timed out (os error 110)")
}

pub fn timed_out() -> TransportError {
    TransportError::TimedOut
}

pub fn reset() -> TransportError {
    TransportError::Connect {
        kind: prtg_request::transport::SocketErrorKind::Other,
        message: "Connection reset by peer (os error 104)".into(),
    }
}

pub fn connection(server: &str) -> ConnectionDetails {
    ConnectionDetails::new(server, "prtgadmin", "12345678").unwrap()
}

pub fn config(retry_count: u32, retry_delay_secs: u64) -> EngineConfig {
    EngineConfig::new()
        .with_retry_count(retry_count)
        .with_retry_delay_secs(retry_delay_secs)
        .with_timeout_secs(10)
        .with_log_level(LogLevel::NONE)
}

/// Engine over `transport` talking to a fake `https://prtg.example.com`.
pub fn scripted_engine(
    transport: Arc<ScriptedTransport>,
    config: EngineConfig,
) -> (RequestEngine, Arc<InMemoryEventSink>) {
    let sink = Arc::new(InMemoryEventSink::new(1000));
    let engine = RequestEngine::builder()
        .config(config)
        .connection(connection("https://prtg.example.com"))
        .transport(transport)
        .event_sink(sink.clone() as Arc<dyn EventSink>)
        .build()
        .unwrap();
    (engine, sink)
}

/// Local server that accepts every connection, writes `head` and then goes silent.
///
/// Connections are held open for the life of the test process.
pub struct StallingServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl StallingServer {
    pub fn start(head: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for conn in listener.incoming() {
                let Ok(mut conn) = conn else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = conn.write_all(head);
                let _ = conn.flush();
                held.push(conn);
            }
        });
        Self { addr, accepted }
    }

    /// Headers of a `200 text/html` reply promising 1000 bytes, followed by three of them.
    pub fn stalled_body() -> Self {
        Self::start(b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 1000\r\n\r\n<p>")
    }

    /// Accepts and never answers.
    pub fn silent() -> Self {
        Self::start(b"")
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Surface engine logs when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
