//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. A match hands the
//! request to the route's composed [`Pipeline`](crate::Pipeline); anything
//! that goes wrong on the way is rendered by [`render::error_response`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;
use crate::render;
use crate::route::Route;

/// The application router.
///
/// Build it once at startup; every [`Router::on`] / [`Router::route`] call
/// returns `self` so registrations chain naturally.
///
/// ```rust
/// use weft::{Context, MediaType, Route, Router};
/// use http::Method;
///
/// async fn get_user(ctx: Context) -> weft::Result<String> {
///     Ok(format!("user {}", ctx.path_param("id").long_value()?))
/// }
/// async fn create_user(_ctx: Context) -> &'static str { "created" }
///
/// let app = Router::new()
///     .on(Method::GET, "/users/{id}", get_user)
///     .route(Route::new(Method::POST, "/users", create_user).consumes([MediaType::JSON]));
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers a bare handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.path_param("name")`
    /// retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid pattern or conflicts with one
    /// already registered for the same method.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(Route::new(method, path, handler))
    }

    /// Registers a fully configured route.
    ///
    /// # Panics
    ///
    /// Same as [`Router::on`].
    pub fn route(mut self, route: Route) -> Self {
        let method = route.method().clone();
        let pattern = route.pattern().to_owned();
        self.routes
            .entry(method)
            .or_default()
            .insert(pattern.as_str(), Arc::new(route))
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<Route>, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params = matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((route, params))
    }

    /// Methods with a route matching `path`, sorted by name.
    pub fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .routes
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Runs one request through the matching route.
    ///
    /// No route for the path is a `404`; a route under another method is a
    /// `405` with an `Allow` header. Pipeline errors are rendered per the
    /// request's `Accept` header.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let Some((route, params)) = self.lookup(&method, &path) else {
            let ctx = Context::from_request(req, HashMap::new());
            return self.unmatched(&ctx);
        };

        let ctx = Context::from_request(req, params);
        match route.pipeline().call(ctx.clone()).await {
            Ok(res) => {
                let res = ctx.render(res);
                if res.status().is_server_error() {
                    warn!(%method, path = %path, status = res.status().as_u16(), "handler returned server error");
                }
                res
            }
            Err(err) => render::error_response(&ctx, &err),
        }
    }

    fn unmatched(&self, ctx: &Context) -> http::Response<Full<Bytes>> {
        let allowed = self.allowed(ctx.path());
        if allowed.is_empty() {
            debug!(method = %ctx.method(), path = ctx.path(), "no route");
            let err = Error::status(StatusCode::NOT_FOUND, ctx.path());
            return render::error_response(ctx, &err);
        }

        let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        debug!(method = %ctx.method(), path = ctx.path(), allow = %allow, "method not allowed");
        let err = Error::status(StatusCode::METHOD_NOT_ALLOWED, ctx.method().as_str());
        let mut res = render::error_response(ctx, &err);
        if let Ok(value) = HeaderValue::try_from(allow) {
            res.headers_mut().insert(ALLOW, value);
        }
        res
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hello(_ctx: Context) -> &'static str {
        "hello"
    }

    #[test]
    fn lookup_extracts_params() {
        let router = Router::new().on(Method::GET, "/users/{id}", hello);
        let (route, params) = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(route.pattern(), "/users/{id}");
        assert_eq!(params["id"], "42");
        assert!(router.lookup(&Method::POST, "/users/42").is_none());
        assert!(router.lookup(&Method::GET, "/users").is_none());
    }

    #[test]
    fn allowed_lists_matching_methods() {
        let router = Router::new()
            .on(Method::PUT, "/items/{id}", hello)
            .on(Method::DELETE, "/items/{id}", hello)
            .on(Method::GET, "/other", hello);
        assert_eq!(router.allowed("/items/1"), [Method::DELETE, Method::PUT]);
        assert!(router.allowed("/missing").is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new().on(Method::GET, "/a/{x}", hello).on(Method::GET, "/a/{y}", hello);
    }
}
