//! The per-request context.
//!
//! Every filter, decorator and handler receives a [`Context`]: request data
//! to read and response state to mutate. It is an explicit argument, never
//! ambient state. Cloning is cheap (one `Arc` increment) and every clone
//! observes the same response state, so a context can be moved into an async
//! block and still be inspected by the stage that spawned it.
//!
//! Once a response is sent, or when a stage receives a
//! [read-only](Context::read_only) view, every mutator fails with
//! [`Error::ResponseStarted`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Full;

use crate::error::{Error, Result};
use crate::media_type::MediaType;
use crate::response::{IntoResponse, Response};
use crate::value::{FileUpload, Value};

/// Request data plus mutable response state for one exchange.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
    read_only: bool,
}

struct Inner {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    form: Value,
    response: Mutex<ResponseState>,
}

#[derive(Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    default_type: Option<MediaType>,
    committed: Option<Response>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Wraps an `http` request. `params` are the path parameters the router
    /// extracted.
    pub fn from_request(req: http::Request<Bytes>, params: HashMap<String, String>) -> Self {
        let (parts, body) = req.into_parts();
        ContextBuilder {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            params,
            form: Vec::new(),
        }
        .build()
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.inner.method }
    pub fn path(&self) -> &str { &self.inner.path }
    pub fn query_string(&self) -> Option<&str> { self.inner.query.as_deref() }
    pub fn body(&self) -> &Bytes { &self.inner.body }
    pub fn request_headers(&self) -> &HeaderMap { &self.inner.headers }

    /// Every value of a request header. Header names are case-insensitive.
    pub fn header(&self, name: &str) -> Value {
        let values = self
            .inner
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok());
        Value::create(name, values)
    }

    /// All request headers as an object keyed by lower-case name.
    pub fn headers(&self) -> Value {
        let headers = &self.inner.headers;
        Value::object(
            "headers",
            headers.keys().map(|name| (name.as_str(), self.header(name.as_str()))),
        )
    }

    /// A query parameter. Dotted and bracketed names address nested values.
    pub fn query(&self, name: &str) -> Value {
        self.query_map().path(name)
    }

    /// The whole query string as an object.
    pub fn query_map(&self) -> Value {
        Value::from_query(self.query_string().unwrap_or_default())
    }

    /// A path parameter captured by the router.
    pub fn path_param(&self, name: &str) -> Value {
        match self.inner.params.get(name) {
            Some(value) => Value::single(name, value.as_str()),
            None => Value::missing(name),
        }
    }

    /// A decoded form field. Names address nested values like [`query`](Context::query).
    pub fn form(&self, name: &str) -> Value {
        self.inner.form.path(name)
    }

    pub fn form_map(&self) -> &Value {
        &self.inner.form
    }

    /// An uploaded file. Fields that are not uploads read as missing.
    pub fn file(&self, name: &str) -> Value {
        match self.inner.form.path(name) {
            upload @ Value::Upload(_) => upload,
            other => Value::missing(other.name()),
        }
    }

    /// The parsed `Content-Type`, if present and well formed.
    pub fn request_type(&self) -> Option<MediaType> {
        let raw = self.inner.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        MediaType::parse(raw).ok()
    }

    /// Negotiates among `produces` against the `Accept` header.
    pub fn accept(&self, produces: &[MediaType]) -> Option<MediaType> {
        MediaType::accept(produces, self.header_str(ACCEPT))
    }

    pub(crate) fn header_str(&self, name: HeaderName) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    // ── Response ─────────────────────────────────────────────────────────────

    /// True once a response has been sent through this context.
    pub fn is_response_started(&self) -> bool {
        self.state().committed.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// A forwarding view: reads see the live request and response state,
    /// writes fail.
    pub fn read_only(&self) -> Context {
        Context { inner: Arc::clone(&self.inner), read_only: true }
    }

    /// The status set so far, `200 OK` if none.
    pub fn status(&self) -> StatusCode {
        self.state().status.unwrap_or(StatusCode::OK)
    }

    pub fn set_status(&self, status: StatusCode) -> Result<()> {
        self.writable()?.status = Some(status);
        Ok(())
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        let state = self.state();
        state.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
    }

    pub fn set_header(&self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::try_from(value).map_err(Error::custom)?;
        self.writable()?.headers.insert(name, value);
        Ok(())
    }

    pub fn set_content_length(&self, length: u64) -> Result<()> {
        self.writable()?.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        Ok(())
    }

    /// The content type used when the handler's result carries none.
    pub fn set_default_response_type(&self, media_type: MediaType) -> Result<()> {
        self.writable()?.default_type = Some(media_type);
        Ok(())
    }

    pub fn default_response_type(&self) -> Option<MediaType> {
        self.state().default_type.clone()
    }

    /// Sends a response right away, merging in the status and headers set so
    /// far. The context is read-only from here on. Returns what was sent.
    pub fn send(&self, response: impl IntoResponse) -> Result<Response> {
        let response = response.into_response()?;
        let mut state = self.writable()?;
        let merged = merge(&state, response);
        state.committed = Some(merged.clone());
        Ok(merged)
    }

    /// The response sent through [`send`](Context::send), if any.
    pub fn committed(&self) -> Option<Response> {
        self.state().committed.clone()
    }

    /// Produces the wire response for a handler result: the committed
    /// response when one was sent, otherwise `result` merged with the
    /// context's status and headers.
    pub fn render(&self, result: Response) -> http::Response<Full<Bytes>> {
        let state = self.state();
        match &state.committed {
            Some(committed) => committed.clone().into_http(),
            None => merge(&state, result).into_http(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ResponseState> {
        self.inner.response.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, ResponseState>> {
        if self.read_only {
            return Err(Error::ResponseStarted);
        }
        let state = self.state();
        if state.committed.is_some() {
            return Err(Error::ResponseStarted);
        }
        Ok(state)
    }
}

/// Context headers first, the result's own headers win. A non-default status
/// on the result wins over the context's status. The default response type
/// fills in a missing `content-type`.
fn merge(state: &ResponseState, result: Response) -> Response {
    let Response { body, headers, status } = result;
    let mut merged = state.headers.clone();
    for name in headers.keys() {
        merged.remove(name);
    }
    for (name, value) in &headers {
        merged.append(name, value.clone());
    }
    if !merged.contains_key(CONTENT_TYPE) {
        let default_type = state.default_type.as_ref().map(|t| match t.charset() {
            Some(charset) if t.param("charset").is_none() => t.with_charset(charset),
            _ => t.clone(),
        });
        if let Some(value) = default_type.and_then(|t| HeaderValue::try_from(t.to_string()).ok()) {
            merged.insert(CONTENT_TYPE, value);
        }
    }
    let status = match state.status {
        Some(explicit) if status == StatusCode::OK => explicit,
        _ => status,
    };
    Response { body, headers: merged, status }
}

// ── ContextBuilder ───────────────────────────────────────────────────────────

/// Builds a [`Context`] by hand: for tests, or for transports that do not
/// speak `http::Request`.
///
/// ```rust
/// use weft::Context;
///
/// let ctx = Context::builder()
///     .path("/users/42")
///     .query("expand=true")
///     .header("accept", "application/json")
///     .param("id", "42")
///     .build();
///
/// assert_eq!(ctx.path_param("id").int_value().unwrap(), 42);
/// assert!(ctx.query("expand").boolean_value().unwrap());
/// ```
pub struct ContextBuilder {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    form: Vec<(String, Value)>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_owned(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            form: Vec::new(),
        }
    }
}

impl ContextBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }

    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_owned());
        self
    }

    /// Appends a request header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::try_from(name).unwrap_or_else(|e| panic!("invalid header `{name}`: {e}"));
        let value = HeaderValue::try_from(value).unwrap_or_else(|e| panic!("invalid header value `{value}`: {e}"));
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Adds a decoded form field. Repeating a name builds an array.
    pub fn form(mut self, name: &str, value: &str) -> Self {
        match self.form.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => {
                let mut values = existing.to_list();
                values.push(value.to_owned());
                *existing = Value::create(name, values);
            }
            None => self.form.push((name.to_owned(), Value::single(name, value))),
        }
        self
    }

    pub fn file(mut self, file: FileUpload) -> Self {
        self.form.push((file.name().to_owned(), Value::upload(file)));
        self
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(Inner {
                method: self.method,
                path: self.path,
                query: self.query,
                headers: self.headers,
                body: self.body,
                params: self.params,
                form: Value::object("form", self.form),
                response: Mutex::new(ResponseState::default()),
            }),
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_RANGE, LOCATION};

    #[test]
    fn request_values() {
        let ctx = Context::builder()
            .method(Method::POST)
            .path("/search")
            .query("q=rust&page=3&filter.lang=en")
            .header("x-tag", "a")
            .header("X-Tag", "b")
            .form("name", "alice")
            .form("name", "bob")
            .file(FileUpload::new("doc", "cv.pdf", &b"%PDF"[..]))
            .build();

        assert_eq!(*ctx.method(), Method::POST);
        assert_eq!(ctx.query("page").int_value().unwrap(), 3);
        assert_eq!(ctx.query("filter").get("lang").value().unwrap(), "en");
        assert!(ctx.query("nope").is_missing());
        assert_eq!(ctx.header("x-tag").to_list(), ["a", "b"]);
        assert_eq!(ctx.headers().get("x-tag").size(), 2);
        assert_eq!(ctx.form("name").to_list(), ["alice", "bob"]);
        assert_eq!(ctx.file("doc").as_upload().unwrap().filename(), "cv.pdf");
        assert!(ctx.file("name").is_missing());
        assert!(ctx.path_param("id").is_missing());
    }

    #[test]
    fn nested_names_reach_nested_values() {
        let ctx = Context::builder()
            .query("user.name=alice&tags[0]=x&tags[1]=y&user[age]=30")
            .form("address.city", "Lima")
            .build();

        assert_eq!(ctx.query("user.name").value().unwrap(), "alice");
        assert_eq!(ctx.query("user[age]").int_value().unwrap(), 30);
        assert_eq!(ctx.query("tags[0]").value().unwrap(), "x");
        assert_eq!(ctx.query("user").get("name").value().unwrap(), "alice");
        assert!(ctx.query("user.email").is_missing());
        assert_eq!(ctx.form("address.city").value().unwrap(), "Lima");
    }

    #[test]
    fn from_http_request() {
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri("/items/7?dry=true")
            .header("content-type", "application/json; charset=utf-8")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        let params = HashMap::from([("id".to_owned(), "7".to_owned())]);
        let ctx = Context::from_request(req, params);

        assert_eq!(ctx.path(), "/items/7");
        assert_eq!(ctx.query_string(), Some("dry=true"));
        assert_eq!(ctx.path_param("id").long_value().unwrap(), 7);
        assert_eq!(ctx.request_type(), Some(MediaType::JSON));
        assert_eq!(ctx.body().as_ref(), b"{}");
    }

    #[test]
    fn response_state_is_shared_between_clones() {
        let ctx = Context::builder().build();
        let clone = ctx.clone();
        clone.set_status(StatusCode::CREATED).unwrap();
        clone.set_header(LOCATION, "/x").unwrap();
        assert_eq!(ctx.status(), StatusCode::CREATED);
        assert_eq!(ctx.response_header("location").as_deref(), Some("/x"));
    }

    #[test]
    fn read_only_forwards_reads_and_rejects_writes() {
        let ctx = Context::builder().header("accept", "text/html").build();
        ctx.set_status(StatusCode::ACCEPTED).unwrap();

        let view = ctx.read_only();
        assert!(view.is_read_only());
        assert_eq!(view.status(), StatusCode::ACCEPTED);
        assert_eq!(view.header("accept").value().unwrap(), "text/html");
        assert!(matches!(view.set_status(StatusCode::OK), Err(Error::ResponseStarted)));
        assert!(matches!(view.set_header(CONTENT_RANGE, "x"), Err(Error::ResponseStarted)));
        assert!(matches!(view.send("late"), Err(Error::ResponseStarted)));
    }

    #[test]
    fn send_commits_once() {
        let ctx = Context::builder().build();
        ctx.set_status(StatusCode::CREATED).unwrap();
        let sent = ctx.send("made").unwrap();
        assert_eq!(sent.status_code(), StatusCode::CREATED);
        assert!(ctx.is_response_started());
        assert!(matches!(ctx.send("again"), Err(Error::ResponseStarted)));
        assert!(matches!(ctx.set_status(StatusCode::OK), Err(Error::ResponseStarted)));

        let wire = ctx.render(Response::text("ignored"));
        assert_eq!(wire.status(), StatusCode::CREATED);
    }

    #[test]
    fn render_merges_state() {
        let ctx = Context::builder().build();
        ctx.set_status(StatusCode::PARTIAL_CONTENT).unwrap();
        ctx.set_header(http::header::ACCEPT_RANGES, "bytes").unwrap();
        ctx.set_default_response_type(MediaType::JSON).unwrap();

        let wire = ctx.render(Response::body(&b"[1]"[..]));
        assert_eq!(wire.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(wire.headers()["accept-ranges"], "bytes");
        assert_eq!(wire.headers()["content-type"], "application/json;charset=UTF-8");

        let wire = ctx.render(Response::status(StatusCode::NO_CONTENT));
        assert_eq!(wire.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn result_content_type_wins_over_default() {
        let ctx = Context::builder().build();
        ctx.set_default_response_type(MediaType::JSON).unwrap();
        let wire = ctx.render(Response::text("plain"));
        assert_eq!(wire.headers()["content-type"], "text/plain; charset=utf-8");
    }
}
