//! Handler results and the [`IntoResponse`] conversion trait.
//!
//! A handler returns anything that converts into a [`Response`]. The
//! [`Context`](crate::Context) merges in whatever status and headers the
//! filters set along the way when the response is finally rendered.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

use crate::error::{Error, Result};
use crate::media_type::MediaType;

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use weft::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use weft::{MediaType, Response};
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder().bytes(MediaType::XML, b"<ok/>".to_vec());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    /// `200 OK` with a body and no content type.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK, error: None }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn bytes(&self) -> &Bytes { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Converts into an `http::Response` with a `content-length` matching
    /// the body.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::new()));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        *res.body_mut() = Full::new(self.body);
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Header values
/// that are not valid HTTP are dropped with a warning.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
    error: Option<String>,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => self.error = Some(format!("{name}: {value}")),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish("application/json", body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    /// Terminate with an HTML body (`text/html; charset=utf-8`).
    pub fn html(self, body: impl Into<String>) -> Response {
        self.finish("text/html; charset=utf-8", Bytes::from(body.into()))
    }

    /// Terminate with a typed body. Use this for XML, binary, SSE, etc.
    pub fn bytes(self, content_type: MediaType, body: impl Into<Bytes>) -> Response {
        self.finish(&content_type.to_string(), body.into())
    }

    /// Terminate with no body (`204`, redirects).
    pub fn no_body(self) -> Response {
        self.finish_with(None, Bytes::new())
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        self.finish_with(HeaderValue::try_from(content_type).ok(), body)
    }

    fn finish_with(mut self, content_type: Option<HeaderValue>, body: Bytes) -> Response {
        if let Some(header) = self.error.take() {
            tracing::warn!(header = %header, "dropping invalid response header");
        }
        if let Some(content_type) = content_type {
            self.headers.insert(CONTENT_TYPE, content_type);
        }
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a handler result.
///
/// Implement on your own types to return them directly from handlers.
/// Returning `Err` hands the error to the caller of the pipeline.
///
/// ```rust,ignore
/// struct Json<T: Serialize>(T);
///
/// impl<T: Serialize> IntoResponse for Json<T> {
///     fn into_response(self) -> weft::Result<Response> {
///         let bytes = serde_json::to_vec(&self.0).map_err(Error::custom)?;
///         Ok(Response::json(bytes))
///     }
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Result<Response>;
}

impl IntoResponse for Response {
    fn into_response(self) -> Result<Response> { Ok(self) }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<Response> { Ok(Response::text(self)) }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<Response> { Ok(Response::text(self)) }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Result<Response> { Ok(Response::body(self)) }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Result<Response> { Ok(Response::body(self)) }
}

/// Return a status directly from a handler: `StatusCode::NO_CONTENT`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Result<Response> { Ok(Response::status(self)) }
}

/// An empty `200 OK`.
impl IntoResponse for () {
    fn into_response(self) -> Result<Response> { Ok(Response::default()) }
}

impl<T, E> IntoResponse for std::result::Result<T, E>
where
    T: IntoResponse,
    E: Into<Error>,
{
    fn into_response(self) -> Result<Response> {
        self.map_err(Into::<Error>::into)?.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts() {
        let res = Response::text("hi");
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(res.bytes().as_ref(), b"hi");

        let res = Response::status(StatusCode::NO_CONTENT);
        assert!(res.bytes().is_empty());
        assert!(res.headers().is_empty());
    }

    #[test]
    fn builder_sets_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .bytes(MediaType::XML, &b"<ok/>"[..]);
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("location"), Some("/users/42"));
        assert_eq!(res.header("content-type"), Some("application/xml"));
    }

    #[test]
    fn builder_drops_invalid_header() {
        let res = Response::builder().header("bad header", "x").no_body();
        assert!(res.headers().is_empty());
    }

    #[test]
    fn into_http_sets_length() {
        let res = Response::json(&b"{}"[..]).into_http();
        assert_eq!(res.headers()[CONTENT_LENGTH], "2");
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn result_conversion() {
        let ok: std::result::Result<&'static str, Error> = Ok("fine");
        assert_eq!(ok.into_response().unwrap().bytes().as_ref(), b"fine");

        let err: std::result::Result<String, StatusCode> = Err(StatusCode::FORBIDDEN);
        assert_eq!(err.into_response().unwrap_err().status_code(), StatusCode::FORBIDDEN);
    }
}
