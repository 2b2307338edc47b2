//! Shared helpers for the integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};

/// A request with no body.
pub fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> http::Request<Bytes> {
    with_body(method, uri, headers, Bytes::new())
}

pub fn with_body(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Bytes>,
) -> http::Request<Bytes> {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

pub async fn body_string(res: http::Response<Full<Bytes>>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Routes library logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
