//! HTTP response building module
//!
//! Builders for the structural responses the dispatcher answers directly,
//! and conversion of a handler's `Response` into a hyper response.

use chrono::{SecondsFormat, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::json;

use crate::script::ScriptResponse;

/// ISO-8601 UTC timestamp with milliseconds
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the plain-text banner served on `/`
pub fn build_banner_response(banner: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(200)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(banner.as_bytes())))
        .unwrap_or_else(|e| {
            log_build_error("banner", &e);
            Response::new(Full::new(Bytes::from_static(banner.as_bytes())))
        })
}

/// Build 400 Bad Request response for a body that could not be read
pub fn build_400_response() -> Response<Full<Bytes>> {
    build_text_response(StatusCode::BAD_REQUEST, "400 Bad Request".to_string())
}

/// Build 404 Not Found response
pub fn build_404_response(path: &str) -> Response<Full<Bytes>> {
    let body = json!({
        "error": "Route not found",
        "path": path,
        "timestamp": timestamp(),
    });
    build_json_response(StatusCode::NOT_FOUND, &body, None)
}

/// Build 405 Method Not Allowed response listing the handler's methods
pub fn build_405_response(method: &str, path: &str, available: &[String]) -> Response<Full<Bytes>> {
    let body = json!({
        "error": format!("Method {method} not allowed"),
        "path": path,
        "availableMethods": available,
        "timestamp": timestamp(),
    });
    let allow = available.join(", ");
    build_json_response(StatusCode::METHOD_NOT_ALLOWED, &body, Some(&allow))
}

/// Build 413 Payload Too Large response
pub fn build_413_response(limit: u64) -> Response<Full<Bytes>> {
    build_text_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("413 Payload Too Large (limit {limit} bytes)"),
    )
}

fn build_text_response(status: StatusCode, text: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(text)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = status;
            response
        })
}

fn build_json_response(
    status: StatusCode,
    body: &serde_json::Value,
    allow: Option<&str>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json");
    if let Some(allow) = allow {
        builder = builder.header(ALLOW, allow);
    }
    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = status;
            response
        })
}

/// Why a handler's `Response` could not be sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidResponse {
    #[error("status {0} is outside 200..=599")]
    Status(String),
    #[error("invalid header name '{0}'")]
    HeaderName(String),
    #[error("invalid value for header '{0}'")]
    HeaderValue(String),
}

/// Convert a handler's `Response` into a hyper response.
///
/// Status defaults to 200 and must be an integer in `200..=599`; a body
/// without an explicit content type is sent as UTF-8 text.
pub fn build_script_response(
    script: ScriptResponse,
) -> Result<Response<Full<Bytes>>, InvalidResponse> {
    let status = match script.status {
        None => StatusCode::OK,
        Some(s) if s.fract() == 0.0 && (200.0..=599.0).contains(&s) => {
            // integral and in range, so the cast is exact
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let code = s as u16;
            StatusCode::from_u16(code).map_err(|_| InvalidResponse::Status(s.to_string()))?
        }
        Some(s) => return Err(InvalidResponse::Status(s.to_string())),
    };

    let mut response = Response::new(Full::new(Bytes::from(script.body)));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in script.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| InvalidResponse::HeaderName(name.clone()))?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|_| InvalidResponse::HeaderValue(name.clone()))?;
        headers.append(header_name, header_value);
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain;charset=UTF-8"),
        );
    }
    Ok(response)
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    tracing::error!("Failed to build {status} response: {error}");
}
