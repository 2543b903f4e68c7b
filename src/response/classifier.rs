//! Text-or-stream decision for completed responses.
//!
//! A response is buffered as text when any of these hold:
//! - response logging is enabled (the body has to be logged),
//! - the session is dirty,
//! - the status is not a success (error bodies are always read by the validator),
//! - the declared content type is not a safe data format.
//!
//! Otherwise it is exposed as a [`ResponseStream`]. Buffering never fails on malformed
//! encodings; bytes are decoded lossily and any anomaly marks the session dirty.

use super::{inspect, DirtyFlag, Response, ResponseBody, ResponseStream};
use crate::config::LogLevel;
use crate::transport::RawResponse;
use crate::Result;

const SAFE_MEDIA_TYPES: &[&str] = &[
    "text/xml",
    "application/xml",
    "application/json",
    "text/json",
    "text/csv",
];

/// Whether a body with this `Content-Type` can be handed to a streaming parser as is.
///
/// Safe means a known structured media type with no charset or a UTF-8 one. A missing
/// header is unsafe.
pub fn is_safe_data_format(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };

    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if !SAFE_MEDIA_TYPES.contains(&media_type.as_str()) {
        return false;
    }

    for param in parts {
        let mut kv = param.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim();
        if key.eq_ignore_ascii_case("charset") {
            let value = kv.next().unwrap_or("").trim().trim_matches('"');
            if !value.eq_ignore_ascii_case("utf-8") && !value.eq_ignore_ascii_case("utf8") {
                return false;
            }
        }
    }

    true
}

pub fn needs_text(raw: &RawResponse, log_level: LogLevel, dirty: bool) -> bool {
    log_level.contains(LogLevel::RESPONSE)
        || dirty
        || !raw.is_success()
        || !is_safe_data_format(raw.content_type())
}

fn decode(bytes: &[u8], flag: &DirtyFlag) -> String {
    inspect(bytes, flag);
    match String::from_utf8_lossy(bytes) {
        std::borrow::Cow::Borrowed(s) => s.to_string(),
        std::borrow::Cow::Owned(s) => {
            if flag.set() {
                tracing::warn!("response was not valid UTF-8; switching session to buffered responses");
            }
            s
        }
    }
}

/// Build the envelope for `raw`, reading the body on the current thread when it must be
/// buffered.
pub fn classify_blocking(raw: RawResponse, log_level: LogLevel, flag: &DirtyFlag) -> Result<Response> {
    if needs_text(&raw, log_level, flag.is_set()) {
        let bytes = raw.body.read_blocking()?;
        let text = decode(&bytes, flag);
        return Ok(Response::new(raw.status, raw.url, ResponseBody::Text(text), flag.clone()));
    }
    let stream = ResponseStream::new(raw.body, flag.clone());
    Ok(Response::new(raw.status, raw.url, ResponseBody::Stream(stream), flag.clone()))
}

/// Async counterpart of [`classify_blocking`].
pub async fn classify(raw: RawResponse, log_level: LogLevel, flag: &DirtyFlag) -> Result<Response> {
    if needs_text(&raw, log_level, flag.is_set()) {
        let bytes = raw.body.read().await?;
        let text = decode(&bytes, flag);
        return Ok(Response::new(raw.status, raw.url, ResponseBody::Text(text), flag.clone()));
    }
    let stream = ResponseStream::new(raw.body, flag.clone());
    Ok(Response::new(raw.status, raw.url, ResponseBody::Stream(stream), flag.clone()))
}
