//! End-to-end dispatch through the router.

use bytes::Bytes;
use http::{Method, StatusCode};
use weft::{ByteRange, Context, Error, MediaType, Response, Route, Router};

mod common;

use common::{body_string, request, with_body};

const CONTENT: &[u8] = b"0123456789abcdefghij";

async fn download(ctx: Context) -> weft::Result<Bytes> {
    let body = Bytes::from_static(CONTENT);
    let range = ByteRange::parse(ctx.header("range").to_optional().as_deref(), body.len() as u64);
    range.apply(&ctx)?;
    Ok(range.slice(&body))
}

// No content type of its own: the negotiated one applies.
async fn get_user(ctx: Context) -> weft::Result<Response> {
    let id = ctx.path_param("id").long_value()?;
    let verbose = ctx.query("verbose").boolean_value_or(false)?;
    Ok(Response::body(format!(r#"{{"id":{id},"verbose":{verbose}}}"#)))
}

async fn create_user(_ctx: Context) -> weft::Result<String> {
    Err(Error::status(StatusCode::CONFLICT, "user exists"))
}

async fn require_token(ctx: Context) -> weft::Result<()> {
    if ctx.header("authorization").is_missing() {
        ctx.send(StatusCode::UNAUTHORIZED)?;
    }
    Ok(())
}

async fn broken(_ctx: Context) -> weft::Result<&'static str> {
    Err(Error::ResponseStarted)
}

fn app() -> Router {
    common::init_tracing();
    Router::new()
        .on(Method::GET, "/files/{name}", download)
        .route(Route::new(Method::GET, "/users/{id}", get_user).produces([MediaType::JSON]))
        .route(
            Route::new(Method::POST, "/users", |_ctx: Context| async { "created" })
                .before(require_token)
                .consumes([MediaType::JSON]),
        )
        .on(Method::GET, "/broken", broken)
}

#[tokio::test]
async fn path_and_query_values_reach_the_handler() {
    let res = app().dispatch(request(Method::GET, "/users/42?verbose=true", &[])).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json;charset=UTF-8");
    assert_eq!(body_string(res).await, r#"{"id":42,"verbose":true}"#);
}

#[tokio::test]
async fn bad_path_param_is_bad_request() {
    let res = app()
        .dispatch(request(Method::GET, "/users/abc", &[("accept", "application/json")]))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "Cannot convert value: 'id', to: 'long'");
}

#[tokio::test]
async fn not_acceptable_is_rendered() {
    let res = app()
        .dispatch(request(Method::GET, "/users/1", &[("accept", "text/plain")]))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(res.headers()["content-type"], "text/plain;charset=utf-8");
    assert!(body_string(res).await.starts_with("406 Not Acceptable\n"));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let res = app()
        .dispatch(request(Method::GET, "/nowhere", &[("accept", "application/json")]))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(body["reason"], "Not Found");
    assert_eq!(body["message"], "/nowhere");
}

#[tokio::test]
async fn wrong_method_lists_allowed_ones() {
    let res = app().dispatch(request(Method::DELETE, "/users", &[])).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "POST");
}

#[tokio::test]
async fn before_filter_short_circuits() {
    let req = with_body(Method::POST, "/users", &[("content-type", "application/json")], "{}");
    let res = app().dispatch(req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(res).await.is_empty());

    let req = with_body(
        Method::POST,
        "/users",
        &[("content-type", "application/json"), ("authorization", "Bearer t")],
        "{}",
    );
    let res = app().dispatch(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "created");
}

#[tokio::test]
async fn unsupported_media_type_wins_over_filters() {
    let req = with_body(Method::POST, "/users", &[("content-type", "text/csv")], "a,b");
    let res = app().dispatch(req).await;
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn partial_content() {
    let res = app()
        .dispatch(request(Method::GET, "/files/a.txt", &[("range", "bytes=5-9")]))
        .await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(res.headers()["content-range"], "bytes 5-9/20");
    assert_eq!(res.headers()["accept-ranges"], "bytes");
    assert_eq!(res.headers()["content-length"], "5");
    assert_eq!(body_string(res).await, "56789");
}

#[tokio::test]
async fn suffix_range() {
    let res = app()
        .dispatch(request(Method::GET, "/files/a.txt", &[("range", "bytes=-4")]))
        .await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(res.headers()["content-range"], "bytes 16-19/20");
    assert_eq!(body_string(res).await, "ghij");
}

#[tokio::test]
async fn full_content_without_range() {
    let res = app().dispatch(request(Method::GET, "/files/a.txt", &[])).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("content-range").is_none());
    assert_eq!(body_string(res).await.as_bytes(), CONTENT);
}

#[tokio::test]
async fn unsatisfiable_range() {
    let res = app()
        .dispatch(request(Method::GET, "/files/a.txt", &[("range", "bytes=30-40")]))
        .await;
    assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn server_errors_render_as_json_without_accept() {
    let res = app().dispatch(request(Method::GET, "/broken", &[])).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(body["reason"], "Internal Server Error");
}

#[tokio::test]
async fn server_errors_fall_back_to_text() {
    let res = app().dispatch(request(Method::GET, "/broken", &[("accept", "image/png")])).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(res).await;
    assert!(body.starts_with("500 Internal Server Error\n"), "{body}");
}

#[tokio::test]
async fn conflict_from_handler() {
    let router = Router::new().on(Method::POST, "/users", create_user);
    let res = router
        .dispatch(request(Method::POST, "/users", &[("accept", "text/html")]))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(body_string(res).await.contains("<p>user exists</p>"));
}
