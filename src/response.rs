//! Outgoing HTTP response, buffered until the callback returns.
//!
//! [`ResponseWriter`] mimics a streaming transport: the header block is
//! committed by the first status or body write, after which status and
//! header changes are dropped with a warning. Nothing reaches the socket
//! until the callback is done, so the buffered body is sent with an exact
//! `content-length`.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::{error, warn};

use crate::logging::TARGET;

pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// The hyper-facing response type.
pub(crate) type HttpResponse = http::Response<Full<Bytes>>;

#[derive(Debug, Default)]
pub(crate) struct ResponseWriter {
    status: Option<u16>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Commits the header block with `code`. Only the first call counts.
    pub(crate) fn write_status(&mut self, code: u16) {
        if let Some(committed) = self.status {
            warn!(target: TARGET, committed, ignored = code, "superfluous status write");
            return;
        }
        self.status = Some(code);
    }

    /// Appends to the body, committing `200 OK` if no status was written.
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK.as_u16());
        }
        self.body.extend_from_slice(bytes);
    }

    /// Sets a header, replacing any previous value. Dropped once committed.
    pub(crate) fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.status.is_some() {
            warn!(target: TARGET, header = %name, "header set after status was written");
            return;
        }
        self.headers.insert(name, value);
    }

    pub(crate) fn into_http(self) -> HttpResponse {
        let code = self.status.unwrap_or(200);
        let status = StatusCode::from_u16(code).unwrap_or_else(|_| {
            error!(target: TARGET, code, "invalid status code, sending 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
impl ResponseWriter {
    /// The committed status, if any.
    pub(crate) fn status(&self) -> Option<u16> {
        self.status
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Plain-text response used for dispatcher-level failures (404, 405, ...).
pub(crate) fn text(status: StatusCode, body: &str) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::from(format!("{body}\n"))));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
        .headers_mut()
        .insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    response
}
