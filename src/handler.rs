//! Pipeline stages and type erasure.
//!
//! # How async stages are stored
//!
//! A route holds stages of *different* concrete types: a handler closure, a
//! couple of before-filters, a decorator. To store and compose them
//! uniformly we hide each concrete type behind a trait object:
//!
//! ```text
//! async fn show(ctx: Context) -> Response { … }   ← user writes this
//!        ↓ Route::new(Method::GET, "/", show)
//! show.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ctx)  at request time              ← one vtable dispatch
//!        ↓
//! Box::pin(async { show(ctx).await.into_response() })  ← BoxFuture
//! ```
//!
//! The same shape repeats for [`Before`], [`After`] and [`Decorator`]. Each
//! public trait is **sealed**: it is satisfied by any `Fn` with the right
//! signature and by nothing else.
//!
//! | Stage | Signature |
//! |---|---|
//! | [`Handler`] | `async fn(Context) -> impl IntoResponse` |
//! | [`Before`] | `async fn(Context) -> weft::Result<()>` |
//! | [`Decorator`] | `async fn(Context, Next) -> impl IntoResponse` |
//! | [`After`] | `async fn(Context, Option<Response>) -> weft::Result<()>` |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets any executor move the future across threads; the
/// stages after it run on whichever thread completes it.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response>>;
}

#[doc(hidden)]
pub trait ErasedBefore {
    fn call(&self, ctx: Context) -> BoxFuture<Result<()>>;
}

#[doc(hidden)]
pub trait ErasedAfter {
    fn call(&self, ctx: Context, result: Option<Response>) -> BoxFuture<Result<()>>;
}

#[doc(hidden)]
pub trait ErasedDecorator {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Result<Response>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;
#[doc(hidden)]
pub type BoxedBefore = Arc<dyn ErasedBefore + Send + Sync + 'static>;
#[doc(hidden)]
pub type BoxedAfter = Arc<dyn ErasedAfter + Send + Sync + 'static>;
#[doc(hidden)]
pub type BoxedDecorator = Arc<dyn ErasedDecorator + Send + Sync + 'static>;

// ── Next ──────────────────────────────────────────────────────────────────────

/// The handler a [`Decorator`] wraps. Call [`run`](Next::run) to continue
/// down the chain, or drop it to skip the inner handler entirely.
#[derive(Clone)]
pub struct Next {
    handler: BoxedHandler,
}

impl Next {
    pub(crate) fn new(handler: BoxedHandler) -> Self {
        Self { handler }
    }

    pub async fn run(self, ctx: Context) -> Result<Response> {
        self.handler.call(ctx).await
    }
}

// ── Public stage traits ───────────────────────────────────────────────────────

/// Implemented for every valid route handler:
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoResponse
/// ```
pub trait Handler: private::Sealed<private::H> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid before-filter. A before-filter that sends a
/// response ends the chain.
///
/// ```text
/// async fn name(ctx: Context) -> weft::Result<()>
/// ```
pub trait Before: private::Sealed<private::B> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_before(self) -> BoxedBefore;
}

/// Implemented for every valid after-filter. It receives the handler's
/// result, or `None` (with a read-only context) when the handler already
/// sent the response.
///
/// ```text
/// async fn name(ctx: Context, result: Option<Response>) -> weft::Result<()>
/// ```
pub trait After: private::Sealed<private::A> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_after(self) -> BoxedAfter;
}

/// Implemented for every valid decorator.
///
/// ```text
/// async fn name(ctx: Context, next: Next) -> impl IntoResponse
/// ```
pub trait Decorator: private::Sealed<private::D> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_decorator(self) -> BoxedDecorator;
}

/// The sealing module. The marker parameter keeps the four blanket impls
/// apart for closures that would fit more than one signature.
mod private {
    pub trait Sealed<Marker> {}
    pub enum H {}
    pub enum B {}
    pub enum A {}
    pub enum D {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed<private::H> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut> private::Sealed<private::B> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
}

impl<F, Fut> Before for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn into_boxed_before(self) -> BoxedBefore {
        Arc::new(FnBefore(self))
    }
}

impl<F, Fut> private::Sealed<private::A> for F
where
    F: Fn(Context, Option<Response>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
}

impl<F, Fut> After for F
where
    F: Fn(Context, Option<Response>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn into_boxed_after(self) -> BoxedAfter {
        Arc::new(FnAfter(self))
    }
}

impl<F, Fut, R> private::Sealed<private::D> for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Decorator for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_decorator(self) -> BoxedDecorator {
        Arc::new(FnDecorator(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Newtype wrappers that hold a concrete `F` and bridge the typed world to
/// the trait-object world.
struct FnHandler<F>(F);
struct FnBefore<F>(F);
struct FnAfter<F>(F);
struct FnDecorator<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_response() })
    }
}

impl<F, Fut> ErasedBefore for FnBefore<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<()>> {
        Box::pin((self.0)(ctx))
    }
}

impl<F, Fut> ErasedAfter for FnAfter<F>
where
    F: Fn(Context, Option<Response>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: Context, result: Option<Response>) -> BoxFuture<Result<()>> {
        Box::pin((self.0)(ctx, result))
    }
}

impl<F, Fut, R> ErasedDecorator for FnDecorator<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Result<Response>> {
        let fut = (self.0)(ctx, next);
        Box::pin(async move { fut.await.into_response() })
    }
}
