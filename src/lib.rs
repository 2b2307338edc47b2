//! # weft
//!
//! Route pipelines for HTTP services: filters, decorators, content
//! negotiation, typed request values and byte ranges.
//!
//! ## The contract
//!
//! weft composes what happens *around* a handler. It does not open sockets
//! or parse HTTP: requests arrive as `http::Request<Bytes>` from whatever
//! server you run, and leave as `http::Response<Full<Bytes>>`.
//!
//! - **Pipelines**: before-filters, decorators and after-filters folded into
//!   one callable per route, see [`Route`]
//! - **Negotiation**: `produces` / `consumes` guards (406 / 415) built on
//!   [`MediaType`]
//! - **Values**: query, form, header and path data as [`Value`], with
//!   coercions and `${...}` templates
//! - **Ranges**: `Range` headers to `206` / `416` via [`ByteRange`]
//!
//! ## Quick start
//!
//! ```rust
//! use bytes::Bytes;
//! use http::{Method, StatusCode};
//! use weft::{ByteRange, Context, MediaType, Response, Route, Router};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let app = Router::new()
//!     .route(
//!         Route::new(Method::GET, "/users/{id}", get_user)
//!             .before(require_token)
//!             .produces([MediaType::JSON]),
//!     )
//!     .on(Method::GET, "/files/{name}", download);
//!
//! let req = http::Request::get("/users/7")
//!     .header("authorization", "Bearer x")
//!     .body(Bytes::new())
//!     .unwrap();
//! let res = app.dispatch(req).await;
//! assert_eq!(res.status(), StatusCode::OK);
//! assert_eq!(res.headers()["content-type"], "application/json;charset=UTF-8");
//! # }
//!
//! async fn require_token(ctx: Context) -> weft::Result<()> {
//!     if ctx.header("authorization").is_missing() {
//!         ctx.send(StatusCode::UNAUTHORIZED)?;
//!     }
//!     Ok(())
//! }
//!
//! async fn get_user(ctx: Context) -> weft::Result<Response> {
//!     let id = ctx.path_param("id").long_value()?;
//!     // weft sends bytes; it doesn't care how you build them.
//!     Ok(Response::body(format!(r#"{{"id":{id}}}"#)))
//! }
//!
//! async fn download(ctx: Context) -> weft::Result<Bytes> {
//!     let body = Bytes::from_static(b"0123456789");
//!     let range = ByteRange::parse(ctx.header("range").to_optional().as_deref(), body.len() as u64);
//!     range.apply(&ctx)?;
//!     Ok(range.slice(&body))
//! }
//! ```

mod byte_range;
mod context;
mod error;
mod handler;
mod media_type;
mod response;
mod route;
mod router;
mod value;

pub mod render;

pub use byte_range::ByteRange;
pub use context::{Context, ContextBuilder};
pub use error::{Error, Result};
pub use handler::{After, Before, BoxFuture, Decorator, Handler, Next};
pub use media_type::MediaType;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use route::{Pipeline, Route};
pub use router::Router;
pub use value::{FileUpload, Value};
