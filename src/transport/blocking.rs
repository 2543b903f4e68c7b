//! Blocking exchanges on a worker thread.
//!
//! `reqwest::blocking` cannot be interrupted once `send()` is called, so the exchange runs on
//! its own thread and the caller waits on channels in short slices, checking the cancellation
//! token and the deadline between slices. The body is pumped through a bounded channel; an
//! abandoned worker finishes on its own once reqwest's timeout fires.

use super::http::classify_reqwest_error;
use super::{RawBody, RawResponse, SocketErrorKind, TransportError};
use bytes::{Buf, Bytes};
use reqwest::header::HeaderMap;
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

const WAIT_SLICE: Duration = Duration::from_millis(50);
const PUMP_CHUNK: usize = 8 * 1024;
const PUMP_DEPTH: usize = 16;

type Chunk = Result<Bytes, TransportError>;

struct Head {
    status: u16,
    url: Url,
    headers: HeaderMap,
}

/// Run one GET on a worker thread, giving up on cancellation or once `timeout` elapses.
///
/// The returned body keeps honoring `token`, and `timeout` as the longest wait for each chunk.
pub(crate) fn exchange(
    client: reqwest::blocking::Client,
    url: &Url,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<RawResponse, TransportError> {
    let (head_tx, head_rx) = mpsc::sync_channel::<Result<Head, TransportError>>(1);
    let (body_tx, body_rx) = mpsc::sync_channel::<Chunk>(PUMP_DEPTH);
    let request = client.get(url.clone()).timeout(timeout);

    std::thread::Builder::new()
        .name("prtg-blocking-get".into())
        .spawn(move || {
            let resp = match request.send() {
                Ok(resp) => resp,
                Err(e) => {
                    let _ = head_tx.send(Err(classify_reqwest_error(e)));
                    return;
                }
            };
            let head = Head {
                status: resp.status().as_u16(),
                url: resp.url().clone(),
                headers: resp.headers().clone(),
            };
            if head_tx.send(Ok(head)).is_ok() {
                pump(resp, body_tx);
            }
        })
        .map_err(|e| TransportError::Other(format!("failed to start request thread: {}", e)))?;

    let head = match wait_for(&head_rx, token, Instant::now() + timeout)? {
        Some(head) => head?,
        None => {
            return Err(TransportError::Other(
                "request thread exited without a response".into(),
            ))
        }
    };

    Ok(RawResponse {
        status: head.status,
        url: head.url,
        headers: head.headers,
        body: RawBody::Reader(Box::new(ChannelReader {
            rx: body_rx,
            token: token.clone(),
            idle: timeout,
            pending: Bytes::new(),
            done: false,
        })),
    })
}

fn pump(mut body: impl Read, tx: SyncSender<Chunk>) {
    loop {
        let mut buf = vec![0u8; PUMP_CHUNK];
        match body.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Ok(Bytes::from(buf))).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(read_error(e)));
                return;
            }
        }
    }
}

/// A failed body read: a timeout stays a timeout, anything else is a broken connection.
fn read_error(e: io::Error) -> TransportError {
    let timed_out = e.kind() == io::ErrorKind::TimedOut
        || e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .map_or(false, reqwest::Error::is_timeout);
    if timed_out {
        TransportError::TimedOut
    } else {
        TransportError::Connect {
            kind: SocketErrorKind::Other,
            message: e.to_string(),
        }
    }
}

/// Next frame from `rx`; `None` once the sender is gone.
fn wait_for<T>(
    rx: &Receiver<T>,
    token: &CancellationToken,
    deadline: Instant,
) -> Result<Option<T>, TransportError> {
    loop {
        if token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::TimedOut);
        }
        match rx.recv_timeout((deadline - now).min(WAIT_SLICE)) {
            Ok(frame) => return Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}

/// Body of a blocking exchange. Read errors carry a [`TransportError`] as their inner error.
struct ChannelReader {
    rx: Receiver<Chunk>,
    token: CancellationToken,
    idle: Duration,
    pending: Bytes,
    done: bool,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            match wait_for(&self.rx, &self.token, Instant::now() + self.idle) {
                Ok(Some(Ok(chunk))) => self.pending = chunk,
                Ok(Some(Err(e))) | Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                Ok(None) => self.done = true,
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}
