//! Request dispatch
//!
//! Per request: intercept reserved paths, resolve the handler file, then
//! load, select and invoke it on the blocking pool. Every failure after a
//! handler file was found is classified and answered with the error
//! envelope; nothing escapes to the transport layer.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::Response;

use super::request::DispatchRequest;
use super::resolver::PathResolver;
use crate::config::Config;
use crate::error::{self, ErrorContext, ErrorKind, Phase, ERROR_ID_HEADER};
use crate::http;
use crate::logger::{self, AccessLogEntry};
use crate::script::{HandlerLoader, OutputCapture, Returned, ScriptError, ScriptLimits, ScriptResponse};

/// Result of the blocking part of a dispatch
#[derive(Debug)]
enum Outcome {
    Responded(ScriptResponse),
    /// No export for the method; carries the advertised methods
    NotAllowed(Vec<String>),
    /// Handler completed with something that is not a `Response`
    Invalid(String),
    Failed {
        phase: Phase,
        cause: Option<ScriptError>,
    },
    /// Job still running when the handler timeout elapsed; `phase` is the
    /// last stage the job had entered
    TimedOut { limit: Duration, phase: Phase },
    /// Job panicked or was cancelled
    Crashed,
}

pub struct Dispatcher {
    resolver: PathResolver,
    loader: Arc<HandlerLoader>,
    timeout: Option<Duration>,
    /// Access log format when access logging is on
    access_log: Option<String>,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        let limits = ScriptLimits {
            loop_iteration_limit: config.handlers.loop_iteration_limit,
            recursion_limit: config.handlers.recursion_limit,
        };
        let mut dispatcher = Self::with_root(config.handler_root(), limits, config.handler_timeout());
        if config.logging.access_log {
            dispatcher.access_log = Some(config.logging.access_log_format.clone());
        }
        dispatcher
    }

    pub fn with_root(root: PathBuf, limits: ScriptLimits, timeout: Option<Duration>) -> Self {
        let resolver = PathResolver::new(root);
        let loader = Arc::new(HandlerLoader::new(resolver.root().to_path_buf(), limits));
        Self {
            resolver,
            loader,
            timeout,
            access_log: None,
        }
    }

    /// Dispatch one request; always yields a response
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        remote: Option<SocketAddr>,
    ) -> Response<Full<Bytes>> {
        let started = Instant::now();
        let response = self.route(&request).await;
        if let Some(ref format) = self.access_log {
            log_access(&request, remote, &response, started, format);
        }
        response
    }

    async fn route(&self, request: &DispatchRequest) -> Response<Full<Bytes>> {
        let method = request.method.as_str();
        let path = request.path();
        tracing::info!("📥 {method} {path}");

        if path == "/" {
            return http::build_banner_response(logger::BANNER);
        }

        let Some(filepath) = self.resolver.resolve(path) else {
            tracing::warn!(error_type = %ErrorKind::RouteNotFound, "❌ Route not found: {path}");
            return http::build_404_response(path);
        };
        let relative = self.resolver.display_relative(&filepath);
        tracing::info!("📁 Loading handler: {relative}");

        let context = ErrorContext::new(method, path).with_filepath(relative);
        match self.execute(filepath, request.clone()).await {
            Outcome::Responded(script) => match http::build_script_response(script) {
                Ok(response) => {
                    tracing::info!("✅ {method} {path} -> {}", response.status().as_u16());
                    response
                }
                Err(invalid) => {
                    tracing::warn!("❌ {method} {path} returned an unusable Response: {invalid}");
                    let cause = ScriptError::new("RangeError", invalid.to_string());
                    let context = context.with_phase(Phase::HandlerExecution);
                    error::build_error_response(ErrorKind::InvalidResponse, &context, Some(&cause))
                }
            },
            Outcome::NotAllowed(available) => {
                tracing::warn!(
                    error_type = %ErrorKind::MethodNotAllowed,
                    "❌ Method {method} not supported for {path}"
                );
                http::build_405_response(method, path, &available)
            }
            Outcome::Invalid(received) => {
                let mut context = context.with_phase(Phase::HandlerExecution);
                context.received = Some(received);
                error::build_error_response(ErrorKind::InvalidResponse, &context, None)
            }
            Outcome::Failed { phase, cause } => {
                tracing::error!("💥 Request failed: {method} {path}");
                error::handle_error(&context.with_phase(phase), cause.as_ref())
            }
            Outcome::TimedOut { limit, phase } => {
                let cause = ScriptError::new(
                    "TimeoutError",
                    format!("handler did not finish within {}ms", limit.as_millis()),
                );
                error::handle_error(&context.with_phase(phase), Some(&cause))
            }
            Outcome::Crashed => error::build_error_response(ErrorKind::InternalError, &context, None),
        }
    }

    /// Run load, select and invoke on the blocking pool, bounded by the
    /// optional timeout
    async fn execute(&self, filepath: PathBuf, request: DispatchRequest) -> Outcome {
        let loader = Arc::clone(&self.loader);
        let invoking = Arc::new(AtomicBool::new(false));
        let job = {
            let invoking = Arc::clone(&invoking);
            tokio::task::spawn_blocking(move || run_handler(&loader, &filepath, &request, &invoking))
        };

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(joined) => joined,
                Err(_) => {
                    let phase = if invoking.load(Ordering::SeqCst) {
                        Phase::HandlerExecution
                    } else {
                        Phase::HandlerLoading
                    };
                    tracing::error!("⏱️ Handler exceeded {}ms", limit.as_millis());
                    return Outcome::TimedOut { limit, phase };
                }
            },
            None => job.await,
        };

        joined.unwrap_or_else(|e| {
            tracing::error!("💥 Handler job crashed: {e}");
            Outcome::Crashed
        })
    }
}

/// Blocking part of a dispatch; owns the engine context from load to drop.
///
/// `invoking` is raised once the selected export is about to be called.
fn run_handler(
    loader: &HandlerLoader,
    filepath: &std::path::Path,
    request: &DispatchRequest,
    invoking: &AtomicBool,
) -> Outcome {
    let request_id = error::short_id();
    let capture = OutputCapture::new(&request_id, request.method.as_str(), request.path());

    capture.scope(|| {
        let mut module = match loader.load(filepath, &capture) {
            Ok(module) => module,
            Err(cause) => {
                tracing::error!("❌ Failed to load handler: {}", filepath.display());
                return Outcome::Failed {
                    phase: Phase::HandlerLoading,
                    cause,
                };
            }
        };

        let exports = module.exports();
        let Some(export) = exports.select(request.method.as_str()) else {
            return Outcome::NotAllowed(exports.available());
        };

        tracing::info!("🔧 Executing {export} handler");
        invoking.store(true, Ordering::SeqCst);
        match module.invoke(export, request) {
            Ok(Returned::Response(response)) => Outcome::Responded(response),
            Ok(Returned::Invalid(received)) => Outcome::Invalid(received),
            Err(cause) => Outcome::Failed {
                phase: Phase::HandlerExecution,
                cause,
            },
        }
    })
}

fn log_access(
    request: &DispatchRequest,
    remote: Option<SocketAddr>,
    response: &Response<Full<Bytes>>,
    started: Instant,
    format: &str,
) {
    let remote_addr = remote.map_or_else(|| "-".to_string(), |addr| addr.ip().to_string());
    let mut entry = AccessLogEntry::new(
        remote_addr,
        request.method.to_string(),
        request.path().to_string(),
    );
    entry.query = request.query().map(ToString::to_string);
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.user_agent = request.user_agent().map(ToString::to_string);
    entry.error_id = response
        .headers()
        .get(ERROR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    logger::log_access(&entry, format);
}
