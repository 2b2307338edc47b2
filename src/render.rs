//! Default error pages.
//!
//! An error that escapes a pipeline becomes a response whose status comes
//! from [`Error::status_code`] and whose body is negotiated against the
//! request's `Accept` header: JSON, HTML or plain text.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde_json::json;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::Error;
use crate::media_type::MediaType;
use crate::response::Response;
use crate::value::Value;

const HTML_TEMPLATE: &str = "<!doctype html>
<html>
<head>
<meta charset=\"utf-8\">
<title>${statusCode} ${reason}</title>
</head>
<body>
<h1>${reason}</h1>
<p>${message}</p>
<hr>
<p>status code: ${statusCode}</p>
</body>
</html>
";

const TEXT_TEMPLATE: &str = "${statusCode} ${reason}\n${message}\n";

/// Renders `err` for the request behind `ctx`.
///
/// When a response was already sent the committed response is returned
/// untouched: there is nothing left to write.
pub fn error_response(ctx: &Context, err: &Error) -> http::Response<Full<Bytes>> {
    if let Some(committed) = ctx.committed() {
        debug!(error = %err, path = ctx.path(), "error after response was sent");
        return committed.into_http();
    }

    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, method = %ctx.method(), path = ctx.path(), "request failed");
    } else {
        debug!(error = %err, status = status.as_u16(), path = ctx.path(), "request rejected");
    }

    let produces = [MediaType::JSON, MediaType::HTML, MediaType::TEXT];
    let media_type = ctx.accept(&produces).unwrap_or(MediaType::TEXT);
    error_page(status, &message(err), &media_type).into_http()
}

/// Builds the error page for `status` in `media_type` (JSON, HTML, or text
/// for anything else).
pub fn error_page(status: StatusCode, message: &str, media_type: &MediaType) -> Response {
    let reason = status.canonical_reason().unwrap_or_default();

    if media_type.is_json() {
        let body = json!({
            "statusCode": status.as_u16(),
            "reason": reason,
            "message": message,
        });
        return Response::builder().status(status).json(body.to_string());
    }

    let html = media_type.subtype() == "html";
    let fields = Value::object(
        "error",
        [
            ("statusCode", Value::single("statusCode", status.as_u16().to_string())),
            ("reason", Value::single("reason", escape(reason, html))),
            ("message", Value::single("message", escape(message, html))),
        ],
    );
    let template = if html { HTML_TEMPLATE } else { TEXT_TEMPLATE };
    let body = fields
        .resolve(template)
        .unwrap_or_else(|_| format!("{} {reason}\n{message}\n", status.as_u16()));

    Response::builder()
        .status(status)
        .bytes(media_type.with_charset("utf-8"), body)
}

/// The human part of an error: status errors carry their own message, the
/// rest use their display form.
fn message(err: &Error) -> String {
    match err {
        Error::Status { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn escape(raw: &str, html: bool) -> String {
    if !html {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
