//! Error reporting module
//!
//! Classifies script failures and renders the stable JSON error envelope:
//!
//! ```text
//! { "error": { "id", "type", "message", "suggestion", "documentation",
//!              "context", "timestamp" } }
//! ```
//!
//! Every envelope carries a short correlation id that also appears in the
//! single log record written for the failure, together with the original
//! cause. Stack traces go to the log only.

mod classify;
mod kind;

pub use classify::{classify, Phase};
pub use kind::{ErrorKind, KindInfo};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;

use crate::http::response::timestamp;
use crate::script::ScriptError;

pub const ERROR_ID_HEADER: &str = "X-Error-ID";
pub const ERROR_TYPE_HEADER: &str = "X-Error-Type";

/// Where in the dispatch a failure happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    /// JS type of a value that was not a `Response`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl ErrorContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_filepath(mut self, filepath: impl Into<String>) -> Self {
        self.filepath = Some(filepath.into());
        self
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: EnvelopeBody<'a>,
}

#[derive(Serialize)]
struct EnvelopeBody<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: ErrorKind,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documentation: Option<&'static str>,
    context: &'a ErrorContext,
    timestamp: String,
}

/// Six hex characters of a random v4 uuid
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(6);
    id
}

/// Classify `cause` in the context's phase and render the envelope
pub fn handle_error(context: &ErrorContext, cause: Option<&ScriptError>) -> Response<Full<Bytes>> {
    let kind = classify(cause, context.phase);
    build_error_response(kind, context, cause)
}

/// Render the error envelope for `kind` and log the failure once
pub fn build_error_response(
    kind: ErrorKind,
    context: &ErrorContext,
    cause: Option<&ScriptError>,
) -> Response<Full<Bytes>> {
    let info = kind.info();
    let id = short_id();

    log_error(&id, kind, &info, context, cause);

    let envelope = Envelope {
        error: EnvelopeBody {
            id: &id,
            kind,
            message: info.message,
            suggestion: info.suggestion,
            documentation: info.documentation,
            context,
            timestamp: timestamp(),
        },
    };
    let body = serde_json::to_string_pretty(&envelope).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize error envelope [{id}]: {e}");
        format!(r#"{{"error":{{"id":"{id}","type":"{kind}"}}}}"#)
    });

    Response::builder()
        .status(info.status)
        .header("Content-Type", "application/json")
        .header(ERROR_ID_HEADER, id.as_str())
        .header(ERROR_TYPE_HEADER, kind.as_str())
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build {kind} response: {e}");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = info.status;
            response
        })
}

fn log_error(
    id: &str,
    kind: ErrorKind,
    info: &KindInfo,
    context: &ErrorContext,
    cause: Option<&ScriptError>,
) {
    let context_json = serde_json::to_string(context).unwrap_or_default();
    match cause {
        Some(cause) => tracing::error!(
            error_id = %id,
            error_type = %kind,
            context = %context_json,
            cause.name = %cause.name,
            cause.message = %cause.message,
            cause.stack = cause.stack.as_deref().unwrap_or(""),
            "💥 Error [{id}] {kind}: {}",
            info.message
        ),
        None => tracing::error!(
            error_id = %id,
            error_type = %kind,
            context = %context_json,
            "💥 Error [{id}] {kind}: {}",
            info.message
        ),
    }
}
