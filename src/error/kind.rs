// Error kinds and their static response table

use hyper::StatusCode;
use serde::Serialize;

/// Closed set of failures the dispatcher reports through the error envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RouteNotFound,
    MethodNotAllowed,
    HandlerLoadFailed,
    HandlerExecutionFailed,
    InvalidResponse,
    CompileError,
    DependencyError,
    InternalError,
}

/// Fixed presentation of one [`ErrorKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub status: StatusCode,
    pub message: &'static str,
    pub documentation: Option<&'static str>,
    pub suggestion: Option<&'static str>,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::HandlerLoadFailed => "HANDLER_LOAD_FAILED",
            Self::HandlerExecutionFailed => "HANDLER_EXECUTION_FAILED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::CompileError => "COMPILE_ERROR",
            Self::DependencyError => "DEPENDENCY_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn info(self) -> KindInfo {
        match self {
            Self::RouteNotFound => KindInfo {
                status: StatusCode::NOT_FOUND,
                message: "API route not found",
                documentation: Some("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/404"),
                suggestion: Some(
                    "Create an index.js file in the directory matching your request path",
                ),
            },
            Self::MethodNotAllowed => KindInfo {
                status: StatusCode::METHOD_NOT_ALLOWED,
                message: "HTTP method not allowed",
                documentation: Some("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/405"),
                suggestion: Some(
                    "Export the corresponding HTTP method function (GET, POST, etc.) or use a 'default' export",
                ),
            },
            Self::HandlerLoadFailed => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Failed to load route handler",
                documentation: Some(
                    "https://developer.mozilla.org/en-US/docs/Web/JavaScript/Guide/Modules",
                ),
                suggestion: Some("Check file syntax and ensure the handler is exported as an ES module"),
            },
            Self::HandlerExecutionFailed => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Handler execution failed",
                documentation: Some(
                    "https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Statements/try...catch",
                ),
                suggestion: Some("Check your handler function for runtime errors"),
            },
            Self::InvalidResponse => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Handler returned invalid response",
                documentation: Some("https://developer.mozilla.org/en-US/docs/Web/API/Response"),
                suggestion: Some("Handler must return a Response object or Promise<Response>"),
            },
            Self::CompileError => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Handler compilation error",
                documentation: Some(
                    "https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Errors",
                ),
                suggestion: Some("Check your handler syntax"),
            },
            Self::DependencyError => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Dependency import error",
                documentation: None,
                suggestion: Some(
                    "Ensure imported modules exist relative to the handler file and restart the server if they moved",
                ),
            },
            Self::InternalError => KindInfo {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal server error",
                documentation: None,
                suggestion: Some(
                    "This is an unexpected error. Please check the logs for more details.",
                ),
            },
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
