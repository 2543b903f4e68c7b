//! Response validation: turns server-reported failures into [`RequestError`]s.
//!
//! The server reports failures in several unrelated shapes. Each shape has its own detector,
//! a pure function over the response; detectors run in priority order and the first match
//! wins:
//!
//! 1. HTTP 400 with an XML body carrying an `<error>` element
//! 2. HTTP 401
//! 3. a success status whose final URL is the `/error.htm` page, message in `errormsg`
//! 4. a success status whose buffered body starts with an inline `<div class="errormsg">`
//!
//! Any other non-success status becomes [`Error::Status`].

use crate::error::{RequestError, RequestErrorKind};
use crate::response::Response;
use crate::transport::RawResponse;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

const ERROR_PAGE_PATH: &str = "/error.htm";
const INLINE_ERROR_PREFIX: &str = "<div class=\"errormsg\">";
const INLINE_ERROR_END: &str = "</h3>";
const ESCAPED_QUOTE: &str = "&%2339;";

static ERROR_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<error(?:\s[^>]*)?>(.*?)</error>").expect("valid regex"));
static SENTENCE_END_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.</.+?><.+?>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.+?>").expect("valid regex"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|lt|gt|amp|quot|apos);").expect("valid regex")
});

/// What the detectors get to look at.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub status: u16,
    pub url: &'a Url,
    /// Buffered body, `None` for streamed responses
    pub text: Option<&'a str>,
}

impl<'a> ResponseView<'a> {
    pub fn new(response: &'a Response) -> Self {
        Self {
            status: response.status(),
            url: response.url(),
            text: response.text(),
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

type Detector = fn(&ResponseView<'_>) -> Option<RequestError>;

const DETECTORS: &[Detector] = &[bad_request, unauthorized, error_page, inline_error];

/// Run every detector against `view` and return the first server-reported failure.
pub fn detect(view: &ResponseView<'_>) -> Option<RequestError> {
    DETECTORS.iter().find_map(|detector| detector(view))
}

/// Fail with the uniform domain error if `response` reports a failure.
pub fn validate(response: &Response) -> Result<()> {
    let view = ResponseView::new(response);
    if let Some(err) = detect(&view) {
        return Err(Error::Request(err));
    }
    if !view.is_success() {
        return Err(Error::Status {
            status: view.status,
            url: view.url.to_string(),
        });
    }
    Ok(())
}

fn bad_request(view: &ResponseView<'_>) -> Option<RequestError> {
    if view.status != 400 {
        return None;
    }
    let body = view.text.unwrap_or_default();
    let message = match ERROR_ELEMENT.captures(body) {
        Some(caps) => markup_text(caps.get(1).map_or("", |m| m.as_str())),
        None => markup_text(body),
    };
    Some(RequestError::new(RequestErrorKind::BadRequest, message))
}

fn unauthorized(view: &ResponseView<'_>) -> Option<RequestError> {
    (view.status == 401).then(RequestError::unauthorized)
}

fn error_page(view: &ResponseView<'_>) -> Option<RequestError> {
    if !view.is_success() || view.url.path() != ERROR_PAGE_PATH {
        return None;
    }

    // Some server versions emit a broken `&#39;` inside the query string.
    let full = view.url.as_str().replace(ESCAPED_QUOTE, "\"");
    let query = full
        .split_once('?')
        .map(|(_, q)| q.split('#').next().unwrap_or(q))
        .unwrap_or_default();

    let raw = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "errormsg")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    let message = raw
        .replace("<br/><ul><li>", " ")
        .replace("</li><li>", " ")
        .replace("</li></ul><br/>", " ");

    Some(RequestError::new(
        RequestErrorKind::ErrorPage,
        message.trim(),
    ))
}

fn inline_error(view: &ResponseView<'_>) -> Option<RequestError> {
    if !view.is_success() {
        return None;
    }
    let text = view.text?;
    if !text.starts_with(INLINE_ERROR_PREFIX) {
        return None;
    }

    let end = text.find(INLINE_ERROR_END).unwrap_or(text.len());
    let head = SENTENCE_END_TAGS.replace_all(&text[..end], ". ");
    let message = TAG.replace_all(&head, "");

    Some(RequestError::new(
        RequestErrorKind::InlineError,
        message.trim(),
    ))
}

/// Text content of a markup fragment: tags dropped, entities decoded.
fn markup_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, "");
    decode_entities(&stripped).trim().to_string()
}

fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = match entity.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Response hook for login flows: rewrites an `error.htm?...errorurl=<target>` final URL into
/// `public/login.htm?loginurl=<target>&errormsg=` so the redirect is not reported as an error
/// page.
pub fn rewrite_error_url_as_login(raw: &mut RawResponse) {
    let url = raw.url.as_str();

    let search = "errorurl=";
    let (Some(target_at), Some(page_at)) = (url.find(search), url.find("error.htm")) else {
        return;
    };

    let mut expected = &url[target_at + search.len()..];
    if let Some(stripped) = expected.strip_suffix("%26") {
        expected = stripped;
    } else if let Some(stripped) = expected.strip_suffix('&') {
        expected = stripped;
    }

    let server = &url[..page_at];
    let rewritten = format!("{}public/login.htm?loginurl={}&errormsg=", server, expected);

    match Url::parse(&rewritten) {
        Ok(new_url) => raw.url = new_url,
        Err(e) => tracing::debug!(error = %e, "could not rewrite error page URL"),
    }
}
