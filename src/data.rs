//! The per-request context handed to every callback.

use std::fmt;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, LOCATION};
use http::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::JsonError;
use crate::logging::{Logging, TARGET};
use crate::redirect;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::strict;

/// One request and its response, for the duration of one callback.
///
/// A `Data` borrows everything it touches and owns nothing; it is dropped
/// when the callback returns. Status codes are plain integers and are
/// passed through unchecked; an [`http::StatusCode`] goes in via `as_u16()`.
///
/// ```rust,no_run
/// use onion::{Data, Router};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Deserialize, Serialize)]
/// struct User { name: String }
///
/// fn create_user(d: &mut Data<'_>) {
///     let Ok(user) = d.json::<User>() else { return };  // 400 already written
///     d.status(201);
///     let _ = d.write_json(&user);
/// }
///
/// let app = Router::new().route("POST /users", create_user);
/// ```
pub struct Data<'a> {
    request: &'a Request,
    response: &'a mut ResponseWriter,
    logging: &'a Logging,
}

impl<'a> Data<'a> {
    pub(crate) fn new(
        request: &'a Request,
        response: &'a mut ResponseWriter,
        logging: &'a Logging,
    ) -> Self {
        Self { request, response, logging }
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    /// Writes the status line. The first status (or body write) commits the
    /// header block; later calls are ignored with a warning.
    pub fn status(&mut self, code: u16) {
        self.response.write_status(code);
    }

    /// Appends `text` to the body. Commits `200` if no status was written.
    /// No content type is set.
    pub fn write(&mut self, text: &str) {
        self.response.write(text.as_bytes());
    }

    /// Sets a response header. Must come before the first status or write.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.response.set_header(name, value),
            _ => warn!(target: TARGET, name, "invalid response header ignored"),
        }
    }

    /// Redirects to `url` with `code`, which should be a 3xx.
    ///
    /// Path-only targets are resolved against the request path, so
    /// `redirect("edit", 303)` from `/posts/7/` goes to `/posts/7/edit`.
    /// Unless a content type was already set, `GET` and `HEAD` requests get
    /// an HTML content type, and `GET` a one-line link body.
    pub fn redirect(&mut self, url: &str, code: u16) {
        let target = redirect::resolve(self.request.path(), url);

        match HeaderValue::try_from(redirect::escape_non_ascii(&target)) {
            Ok(location) => self.response.set_header(LOCATION, location),
            Err(_) => warn!(target: TARGET, url, "redirect target is not a valid header value"),
        }

        let method = self.request.method();
        let html = !self.response.headers().contains_key(CONTENT_TYPE)
            && (*method == Method::GET || *method == Method::HEAD);
        if html {
            self.response
                .set_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        }

        self.response.write_status(code);

        if html && *method == Method::GET {
            let reason = StatusCode::from_u16(code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("");
            let body = format!("<a href=\"{}\">{reason}</a>.\n", redirect::escape_html(&target));
            self.response.write(body.as_bytes());
        }
    }

    /// The value bound to path variable `name`, or `""` when unbound.
    pub fn param(&self, name: &str) -> &'a str {
        self.try_param(name).unwrap_or("")
    }

    /// Like [`param`](Self::param), but tells an unbound name apart from an
    /// empty value.
    pub fn try_param(&self, name: &str) -> Option<&'a str> {
        self.request.param(name)
    }

    /// Logs `err` and answers `500 Internal Server Error`.
    ///
    /// Always logged, whatever the [`LogLevel`](crate::LogLevel).
    pub fn error(&mut self, err: impl fmt::Display) {
        self.logging.internal_error(&err);
        self.response.write_status(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
    }

    /// Decodes the request body as exactly one JSON value of type `T`.
    ///
    /// Object keys that `T` (or any struct nested in it) does not declare are
    /// rejected, as is anything but whitespace after the value. On failure
    /// the response gets `400 Bad Request`, the failure is logged unless the
    /// level is [`LogLevel::None`](crate::LogLevel::None), and the error is
    /// returned. On success the status is left alone.
    ///
    /// Keys that reach a `#[serde(flatten)]` field, or an internally tagged
    /// or untagged enum, are not checked: serde buffers those before the
    /// target type sees them.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, JsonError> {
        strict::from_slice(self.request.body()).map_err(|err| {
            self.response.write_status(StatusCode::BAD_REQUEST.as_u16());
            self.logging.invalid_request(&err);
            err
        })
    }

    /// Serializes `value` and writes it as the body.
    ///
    /// Sets neither a status nor a content type. If `value` cannot be
    /// represented as JSON this goes through [`error`](Self::error) with the
    /// value's `Debug` form, so the response is `500` and the failure is
    /// always logged.
    pub fn write_json<T>(&mut self, value: &T) -> Result<(), JsonError>
    where
        T: Serialize + fmt::Debug + ?Sized,
    {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.response.write(&bytes);
                Ok(())
            }
            Err(e) => {
                self.error(format!("invalid json object {value:?}: {e}"));
                Err(JsonError::Encode(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use serde::{Deserialize, Serializer, ser};
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::LogLevel;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Capture {
        type Writer = Capture;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    /// Runs `f` against a fresh context and returns the response plus
    /// everything logged meanwhile.
    fn run(
        request: Request,
        logging: Logging,
        f: impl FnOnce(&mut Data<'_>),
    ) -> (ResponseWriter, String) {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();

        let mut response = ResponseWriter::new();
        tracing::subscriber::with_default(subscriber, || {
            f(&mut Data::new(&request, &mut response, &logging));
        });

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        (response, logs)
    }

    fn get(uri: &str) -> Request {
        Request::for_test(Method::GET, uri, "", &[])
    }

    fn post(body: &str) -> Request {
        Request::for_test(Method::POST, "/things", body, &[])
    }

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Thing {
        a: i64,
        #[serde(default)]
        label: Option<String>,
    }

    #[derive(Debug)]
    struct Callback;

    impl Serialize for Callback {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(ser::Error::custom("functions cannot be serialized"))
        }
    }

    #[test]
    fn status_then_write() {
        let (w, _) = run(get("/"), Logging::default(), |d| {
            d.status(StatusCode::CREATED.as_u16());
            d.write("made");
        });
        assert_eq!(w.status(), Some(201));
        assert_eq!(w.body(), b"made");
        assert!(!w.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn writes_concatenate_under_implicit_ok() {
        let (w, _) = run(get("/"), Logging::default(), |d| {
            d.write("hello, ");
            d.write("world");
        });
        assert_eq!(w.status(), Some(200));
        assert_eq!(w.body(), b"hello, world");
    }

    #[test]
    fn second_status_is_ignored() {
        let (w, logs) = run(get("/"), Logging::default(), |d| {
            d.status(204);
            d.status(500);
        });
        assert_eq!(w.status(), Some(204));
        assert!(logs.contains("superfluous status write"), "{logs}");
    }

    #[test]
    fn redirect_sets_location_and_status() {
        let (w, _) = run(get("/account"), Logging::default(), |d| d.redirect("/login", 302));
        assert_eq!(w.status(), Some(302));
        assert_eq!(w.headers()[LOCATION], "/login");
        assert_eq!(w.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(w.body(), b"<a href=\"/login\">Found</a>.\n");
    }

    #[test]
    fn redirect_resolves_relative_targets() {
        let (w, _) = run(get("/posts/7/"), Logging::default(), |d| d.redirect("edit?x=1", 303));
        assert_eq!(w.headers()[LOCATION], "/posts/7/edit?x=1");
    }

    #[test]
    fn redirect_on_post_has_no_body() {
        let (w, _) = run(post(""), Logging::default(), |d| d.redirect("/done", 303));
        assert_eq!(w.status(), Some(303));
        assert_eq!(w.headers()[LOCATION], "/done");
        assert!(!w.headers().contains_key(CONTENT_TYPE));
        assert!(w.body().is_empty());
    }

    #[test]
    fn redirect_on_head_has_content_type_only() {
        let request = Request::for_test(Method::HEAD, "/account", "", &[]);
        let (w, _) = run(request, Logging::default(), |d| d.redirect("/login", 302));
        assert_eq!(w.status(), Some(302));
        assert_eq!(w.headers()[LOCATION], "/login");
        assert_eq!(w.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(w.body().is_empty());
    }

    #[test]
    fn redirect_after_status_keeps_first_status() {
        let (w, logs) = run(get("/account"), Logging::default(), |d| {
            d.status(200);
            d.redirect("/login", 302);
        });
        assert_eq!(w.status(), Some(200));
        assert!(!w.headers().contains_key(LOCATION));
        assert!(logs.contains("header set after status was written"), "{logs}");
        assert!(logs.contains("superfluous status write"), "{logs}");
    }

    #[test]
    fn redirect_respects_caller_content_type() {
        let (w, _) = run(get("/"), Logging::default(), |d| {
            d.set_header("content-type", "application/json");
            d.redirect("https://example.com/", 307);
        });
        assert_eq!(w.status(), Some(307));
        assert_eq!(w.headers()[LOCATION], "https://example.com/");
        assert_eq!(w.headers()[CONTENT_TYPE], "application/json");
        assert!(w.body().is_empty());
    }

    #[test]
    fn params() {
        let request = Request::for_test(Method::GET, "/users/42", "", &[("id", "42"), ("tag", "")]);
        run(request, Logging::default(), |d| {
            assert_eq!(d.param("id"), "42");
            assert_eq!(d.param("missing"), "");
            assert_eq!(d.try_param("missing"), None);
            assert_eq!(d.try_param("tag"), Some(""));
        });
    }

    #[test]
    fn error_logs_and_answers_500() {
        let (w, logs) = run(get("/"), Logging::new(LogLevel::None), |d| d.error("db down"));
        assert_eq!(w.status(), Some(500));
        assert!(logs.contains("internal server error: db down"), "{logs}");
        assert!(logs.contains("onion"), "{logs}");
    }

    #[test]
    fn json_success_leaves_status_alone() {
        let mut decoded = None;
        let (w, logs) = run(post(r#"{"a":1,"label":"x"}"#), Logging::default(), |d| {
            decoded = Some(d.json::<Thing>().unwrap());
        });
        assert_eq!(decoded, Some(Thing { a: 1, label: Some("x".into()) }));
        assert_eq!(w.status(), None);
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn json_unknown_field_is_400() {
        let mut result = None;
        let (w, logs) = run(post(r#"{"a":1,"b":2}"#), Logging::default(), |d| {
            result = Some(d.json::<Thing>());
        });
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, JsonError::Decode(_)));
        assert_eq!(w.status(), Some(400));
        assert!(logs.contains("invalid request"), "{logs}");
        assert!(logs.contains("unknown field `b`"), "{logs}");
    }

    #[test]
    fn json_trailing_value_is_400() {
        let mut result = None;
        let (w, logs) = run(post(r#"{"a":1}{"b":2}"#), Logging::default(), |d| {
            result = Some(d.json::<Thing>());
        });
        assert!(matches!(result.unwrap(), Err(JsonError::TrailingData(_))));
        assert_eq!(w.status(), Some(400));
        assert!(logs.contains("extra data in request"), "{logs}");
    }

    #[test]
    fn json_failures_are_silent_at_log_none() {
        let (w, logs) = run(post("not json"), Logging::new(LogLevel::None), |d| {
            assert!(d.json::<Thing>().is_err());
        });
        assert_eq!(w.status(), Some(400));
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn write_json_writes_body_only() {
        let (w, _) = run(get("/"), Logging::default(), |d| {
            d.write_json(&Thing { a: 3, label: None }).unwrap();
        });
        assert_eq!(w.status(), Some(200));
        assert_eq!(w.body(), br#"{"a":3,"label":null}"#);
        assert!(!w.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn write_json_failure_is_500_with_value_in_log() {
        let mut result = None;
        let (w, logs) = run(get("/"), Logging::new(LogLevel::None), |d| {
            result = Some(d.write_json(&Callback));
        });
        assert!(matches!(result.unwrap(), Err(JsonError::Encode(_))));
        assert_eq!(w.status(), Some(500));
        assert!(w.body().is_empty());
        assert!(logs.contains("invalid json object Callback"), "{logs}");
    }

    #[test]
    fn write_json_rejects_non_string_keys() {
        let value = HashMap::from([(vec![1u8, 2], 3)]);
        let (w, logs) = run(get("/"), Logging::default(), |d| {
            assert!(d.write_json(&value).is_err());
        });
        assert_eq!(w.status(), Some(500));
        assert!(logs.contains("invalid json object {[1, 2]: 3}"), "{logs}");
    }

    #[test]
    fn json_round_trips_through_write_json() {
        let original = Thing { a: -9, label: Some("round".into()) };
        let (w, _) = run(get("/"), Logging::default(), |d| d.write_json(&original).unwrap());

        let body = String::from_utf8(w.body().to_vec()).unwrap();
        let mut back = None;
        run(post(&body), Logging::default(), |d| back = Some(d.json::<Thing>().unwrap()));
        assert_eq!(back, Some(original));
    }
}
