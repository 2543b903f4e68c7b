//! Response envelope.
//!
//! Every physical exchange yields one [`Response`]: either fully buffered text or a lazily read
//! [`ResponseStream`], chosen by the [`classifier`]. The envelope also carries the session
//! "dirty" marker and a handle to raise it, so whoever consumes the body can report content
//! that is unsafe to stream (an embedded NUL, invalid UTF-8) and force buffered handling for
//! the rest of the session.

pub mod classifier;

use crate::transport::{transport_or_io, BodyStream, RawBody};
use crate::Result;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::borrow::Cow;
use std::io::{self, Read};
use tokio_util::io::StreamReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Session-wide, one-way "unsafe content seen" marker.
///
/// Clones share the same flag. It only ever goes from `false` to `true`, so concurrent writers
/// need no lock.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag(Arc<AtomicBool>);

impl DirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Raise the flag. Returns `true` only for the call that performed the transition.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }
}

/// Raise `flag` if `bytes` cannot be safely streamed into a parser.
pub(crate) fn inspect(bytes: &[u8], flag: &DirtyFlag) {
    if bytes.contains(&0) && flag.set() {
        tracing::warn!("response contained a NUL byte; switching session to buffered responses");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Text,
    Stream,
}

pub enum ResponseBody {
    Text(String),
    Stream(ResponseStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The result of one physical request.
#[derive(Debug)]
pub struct Response {
    status: u16,
    url: Url,
    body: ResponseBody,
    dirty: bool,
    flag: DirtyFlag,
}

impl Response {
    pub(crate) fn new(status: u16, url: Url, body: ResponseBody, flag: DirtyFlag) -> Self {
        Self {
            status,
            url,
            body,
            dirty: flag.is_set(),
            flag,
        }
    }

    /// A buffered response outside of any engine session, mostly for tests and hooks.
    pub fn from_text(status: u16, url: Url, text: impl Into<String>) -> Self {
        Self::new(status, url, ResponseBody::Text(text.into()), DirtyFlag::new())
    }

    pub fn kind(&self) -> ResponseKind {
        match self.body {
            ResponseBody::Text(_) => ResponseKind::Text,
            ResponseBody::Stream(_) => ResponseKind::Stream,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Final request URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the session was dirty when this response was built.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Report a decode anomaly found while consuming this response.
    pub fn mark_dirty(&self) {
        self.flag.set();
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(s) => Some(s),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Buffered text with characters that are illegal in XML removed when the response is
    /// dirty; unchanged otherwise.
    pub fn sanitized_text(&self) -> Option<Cow<'_, str>> {
        let text = self.text()?;
        if !self.dirty {
            return Some(Cow::Borrowed(text));
        }
        Some(Cow::Owned(
            text.chars().filter(|c| is_xml_char(*c)).collect::<String>(),
        ))
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    pub fn into_stream(self) -> Option<ResponseStream> {
        match self.body {
            ResponseBody::Stream(s) => Some(s),
            ResponseBody::Text(_) => None,
        }
    }

    /// The body as text, draining the stream on the current thread if needed.
    pub fn into_text_blocking(self) -> Result<String> {
        match self.body {
            ResponseBody::Text(s) => Ok(s),
            ResponseBody::Stream(s) => {
                let bytes = s.into_bytes_blocking()?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    /// The body as text, draining the stream asynchronously if needed.
    pub async fn into_text(self) -> Result<String> {
        match self.body {
            ResponseBody::Text(s) => Ok(s),
            ResponseBody::Stream(s) => {
                let bytes = s.into_bytes().await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

enum Source {
    Buffered(Bytes),
    Reader(Box<dyn Read + Send>),
    Chunks(BodyStream),
}

/// Lazily read response body.
///
/// Every byte handed out is checked for content that is unsafe to stream; finding any marks
/// the owning session dirty.
///
/// Bodies of async requests are read with [`chunk`](Self::chunk), [`into_bytes`](Self::into_bytes)
/// or [`into_async_read`](Self::into_async_read). Their [`Read`] impl fails with
/// [`io::ErrorKind::Unsupported`]; only bodies of blocking requests can be read synchronously.
pub struct ResponseStream {
    source: Source,
    pending: Bytes,
    flag: DirtyFlag,
}

const READ_CHUNK: usize = 8 * 1024;

impl ResponseStream {
    pub(crate) fn new(body: RawBody, flag: DirtyFlag) -> Self {
        let source = match body {
            RawBody::Bytes(b) => Source::Buffered(b),
            RawBody::Reader(r) => Source::Reader(r),
            RawBody::Stream(s) => Source::Chunks(s),
        };
        Self {
            source,
            pending: Bytes::new(),
            flag,
        }
    }

    /// Next chunk of the body, or `None` at the end.
    ///
    /// Reader-backed bodies (blocking transports) are read in place.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let next = if !self.pending.is_empty() {
            Some(std::mem::take(&mut self.pending))
        } else {
            match &mut self.source {
                Source::Buffered(b) => {
                    if b.is_empty() {
                        None
                    } else {
                        Some(std::mem::take(b))
                    }
                }
                Source::Chunks(s) => s.next().await.transpose()?,
                Source::Reader(r) => {
                    let mut buf = vec![0u8; READ_CHUNK];
                    let n = r.read(&mut buf).map_err(transport_or_io)?;
                    if n == 0 {
                        None
                    } else {
                        buf.truncate(n);
                        Some(Bytes::from(buf))
                    }
                }
            }
        };
        if let Some(chunk) = &next {
            inspect(chunk, &self.flag);
        }
        Ok(next)
    }

    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    pub fn into_bytes_blocking(mut self) -> Result<Bytes> {
        let mut out = Vec::new();
        self.read_to_end(&mut out).map_err(transport_or_io)?;
        Ok(Bytes::from(out))
    }

    /// The body as a `tokio` [`AsyncRead`](tokio::io::AsyncRead).
    pub fn into_async_read(self) -> StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes> {
        let chunks = futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e)), None)),
            }
        });
        StreamReader::new(chunks.boxed())
    }
}

impl Read for ResponseStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            n
        } else {
            match &mut self.source {
                Source::Buffered(b) => {
                    let n = buf.len().min(b.len());
                    buf[..n].copy_from_slice(&b[..n]);
                    b.advance(n);
                    n
                }
                Source::Reader(r) => r.read(buf)?,
                Source::Chunks(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "the body of an async request must be read asynchronously",
                    ))
                }
            }
        };

        inspect(&buf[..n], &self.flag);
        Ok(n)
    }
}
