//! Routes and pipeline composition.
//!
//! A [`Route`] collects the cross-cutting pieces of one endpoint and folds
//! them into a single callable [`Pipeline`]:
//!
//! ```text
//! base     = decorators wrapped around handler  (first declared is outermost)
//! pipeline = before.then(base)                  (if any before stage)
//! pipeline = pipeline.then(after)               (if any after-filter)
//! ```
//!
//! - `before.then(next)` runs the before stages in order and stops as soon
//!   as one of them sends a response; `next` only runs if none did.
//! - `handler.then(after)` runs the handler, then the after-filter. If the
//!   response was already sent, the after-filter gets a read-only context and
//!   no result; otherwise the live context and the handler's result.
//!
//! [`Route::produces`] and [`Route::consumes`] **prepend** a negotiation
//! guard to the before stages, so guards always run ahead of user filters,
//! and the most recent declaration runs first.
//!
//! Composition is pure. The pipeline is computed on first use and cached;
//! [`Route::compose`] rebuilds an equivalent one on demand.

use std::fmt;
use std::sync::{Arc, OnceLock};

use http::Method;
use http::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{
    After, Before, BoxFuture, BoxedAfter, BoxedBefore, BoxedDecorator, BoxedHandler, Decorator,
    ErasedAfter, ErasedBefore, ErasedHandler, Handler, Next,
};
use crate::media_type::MediaType;
use crate::response::Response;

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The composed, executable chain of one route.
#[derive(Clone)]
pub struct Pipeline(BoxedHandler);

impl Pipeline {
    /// Runs the chain. Errors from any stage come back unchanged.
    pub fn call(&self, ctx: Context) -> BoxFuture<Result<Response>> {
        self.0.call(ctx)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pipeline")
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// One endpoint: method, path pattern, handler and its filters.
///
/// Built once at startup, shared read-only afterwards.
///
/// ```rust
/// use weft::{Context, MediaType, Route};
/// use http::Method;
///
/// async fn list(_ctx: Context) -> &'static str { "[]" }
///
/// let route = Route::new(Method::GET, "/items", list)
///     .produces([MediaType::JSON])
///     .consumes([MediaType::JSON]);
///
/// assert_eq!(route.produce_types(), [MediaType::JSON]);
/// ```
pub struct Route {
    method: Method,
    pattern: String,
    handler: BoxedHandler,
    before: Vec<Stage>,
    decorators: Vec<BoxedDecorator>,
    after: Vec<BoxedAfter>,
    produces: Vec<MediaType>,
    consumes: Vec<MediaType>,
    pipeline: OnceLock<Pipeline>,
}

/// One entry of the before chain. Guards are materialised at composition
/// time so they see the route's final media type lists.
#[derive(Clone)]
enum Stage {
    Accept,
    SupportMediaType,
    Filter(BoxedBefore),
}

impl Route {
    pub fn new(method: Method, pattern: &str, handler: impl Handler) -> Self {
        Self {
            method,
            pattern: pattern.to_owned(),
            handler: handler.into_boxed_handler(),
            before: Vec::new(),
            decorators: Vec::new(),
            after: Vec::new(),
            produces: Vec::new(),
            consumes: Vec::new(),
            pipeline: OnceLock::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn produce_types(&self) -> &[MediaType] { &self.produces }
    pub fn consume_types(&self) -> &[MediaType] { &self.consumes }

    /// Appends a before-filter. Filters run in declaration order, after every
    /// negotiation guard.
    pub fn before(mut self, filter: impl Before) -> Self {
        self.before.push(Stage::Filter(filter.into_boxed_before()));
        self.invalidate()
    }

    /// Wraps the handler. The first decorator declared is the outermost.
    pub fn decorator(mut self, decorator: impl Decorator) -> Self {
        self.decorators.push(decorator.into_boxed_decorator());
        self.invalidate()
    }

    /// Appends an after-filter. After-filters run in declaration order.
    pub fn after(mut self, filter: impl After) -> Self {
        self.after.push(filter.into_boxed_after());
        self.invalidate()
    }

    /// Declares response types and prepends the `Accept` guard (406).
    /// An empty list changes nothing.
    pub fn produces(mut self, types: impl IntoIterator<Item = MediaType>) -> Self {
        let before = self.produces.len();
        self.produces.extend(types);
        if self.produces.len() > before {
            self.before.insert(0, Stage::Accept);
        }
        self.invalidate()
    }

    /// Declares accepted request body types and prepends the `Content-Type`
    /// guard (415). An empty list changes nothing.
    pub fn consumes(mut self, types: impl IntoIterator<Item = MediaType>) -> Self {
        let before = self.consumes.len();
        self.consumes.extend(types);
        if self.consumes.len() > before {
            self.before.insert(0, Stage::SupportMediaType);
        }
        self.invalidate()
    }

    /// The cached pipeline, composed on first access.
    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline.get_or_init(|| self.compose())
    }

    /// Composes a fresh pipeline without touching the cache. Pure: any two
    /// results behave identically.
    pub fn compose(&self) -> Pipeline {
        let mut pipeline = Arc::clone(&self.handler);

        for decorator in self.decorators.iter().rev() {
            pipeline = Arc::new(Decorated { decorator: Arc::clone(decorator), next: pipeline });
        }

        if !self.before.is_empty() {
            let produces: Arc<[MediaType]> = self.produces.clone().into();
            let consumes: Arc<[MediaType]> = self.consumes.clone().into();
            let stages = self
                .before
                .iter()
                .map(|stage| match stage {
                    Stage::Accept => Arc::new(AcceptGuard(Arc::clone(&produces))) as BoxedBefore,
                    Stage::SupportMediaType => Arc::new(ConsumeGuard(Arc::clone(&consumes))) as BoxedBefore,
                    Stage::Filter(filter) => Arc::clone(filter),
                })
                .collect();
            pipeline = Arc::new(BeforeThen { stages, next: pipeline });
        }

        if !self.after.is_empty() {
            pipeline = Arc::new(ThenAfter { handler: pipeline, after: self.after.clone() });
        }

        debug!(
            method = %self.method,
            pattern = %self.pattern,
            before = self.before.len(),
            decorators = self.decorators.len(),
            after = self.after.len(),
            "pipeline composed"
        );
        Pipeline(pipeline)
    }

    fn invalidate(mut self) -> Self {
        self.pipeline = OnceLock::new();
        self
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("produces", &self.produces)
            .field("consumes", &self.consumes)
            .finish_non_exhaustive()
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// `before.then(next)`: stages in order, stop at the first sent response.
struct BeforeThen {
    stages: Arc<[BoxedBefore]>,
    next: BoxedHandler,
}

impl ErasedHandler for BeforeThen {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response>> {
        let stages = Arc::clone(&self.stages);
        let next = Arc::clone(&self.next);
        Box::pin(async move {
            for stage in stages.iter() {
                stage.call(ctx.clone()).await?;
                if let Some(sent) = ctx.committed() {
                    return Ok(sent);
                }
            }
            next.call(ctx).await
        })
    }
}

/// `decorator.wrap(next)`.
struct Decorated {
    decorator: BoxedDecorator,
    next: BoxedHandler,
}

impl ErasedHandler for Decorated {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response>> {
        self.decorator.call(ctx, Next::new(Arc::clone(&self.next)))
    }
}

/// `handler.then(after)`.
struct ThenAfter {
    handler: BoxedHandler,
    after: Vec<BoxedAfter>,
}

impl ErasedHandler for ThenAfter {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response>> {
        let handler = Arc::clone(&self.handler);
        let after = self.after.clone();
        Box::pin(async move {
            let result = handler.call(ctx.clone()).await?;
            for filter in &after {
                if ctx.is_response_started() {
                    filter.call(ctx.read_only(), None).await?;
                } else {
                    filter.call(ctx.clone(), Some(result.clone())).await?;
                }
            }
            Ok(result)
        })
    }
}

/// Fails with 406 unless one of the produced types is acceptable; the
/// negotiated type becomes the default response type.
struct AcceptGuard(Arc<[MediaType]>);

impl ErasedBefore for AcceptGuard {
    fn call(&self, ctx: Context) -> BoxFuture<Result<()>> {
        let produces = Arc::clone(&self.0);
        Box::pin(async move {
            match ctx.accept(&produces) {
                Some(media_type) => ctx.set_default_response_type(media_type),
                None => {
                    let accept = ctx.header_str(ACCEPT);
                    debug!(accept, path = ctx.path(), "no acceptable media type");
                    Err(Error::not_acceptable(accept))
                }
            }
        })
    }
}

/// Fails with 415 unless the request's `Content-Type` is present and matches
/// a consumed type.
struct ConsumeGuard(Arc<[MediaType]>);

impl ErasedBefore for ConsumeGuard {
    fn call(&self, ctx: Context) -> BoxFuture<Result<()>> {
        let consumes = Arc::clone(&self.0);
        Box::pin(async move {
            let supported = ctx
                .request_type()
                .is_some_and(|content_type| consumes.iter().any(|c| c.is_compatible(&content_type)));
            if supported {
                return Ok(());
            }
            let content_type = ctx.header_str(CONTENT_TYPE);
            debug!(content_type, path = ctx.path(), "unsupported media type");
            Err(Error::unsupported_media_type(content_type))
        })
    }
}
