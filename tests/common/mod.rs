//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tracing_subscriber::fmt::MakeWriter;

pub fn request(method: &str, uri: &str, body: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::copy_from_slice(body.as_bytes()))
        .unwrap()
}

pub async fn body_string(response: http::Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

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

/// Runs `f` with a subscriber that records formatted events, and returns
/// its result with everything logged meanwhile.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    (out, logs)
}

/// Installs a recording subscriber on the current thread until the guard is
/// dropped. Suits `#[tokio::test]`, whose runtime runs every task on the
/// test thread.
pub fn record_logs() -> (tracing::subscriber::DefaultGuard, impl Fn() -> String) {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);
    let read = move || String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    (guard, read)
}
