// Connection handling module
// Accepts TCP connections, serves HTTP/1.1 on them and adapts requests for the dispatcher

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_LENGTH, SERVER};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;

use crate::config::Config;
use crate::handler::{DispatchRequest, Dispatcher};
use crate::http;
use crate::logger;

/// Everything a connection task needs, shared across connections
pub struct ServerContext {
    pub dispatcher: Dispatcher,
    pub keep_alive: bool,
    pub connection_timeout: Duration,
    pub max_connections: Option<usize>,
    pub max_body_size: u64,
    pub server_name: HeaderValue,
    pub active_connections: AtomicUsize,
}

impl ServerContext {
    pub fn new(config: &Config) -> Self {
        let server_name = HeaderValue::from_str(&config.http.server_name).unwrap_or_else(|_| {
            tracing::warn!(
                "http.server_name '{}' is not a valid header value; using default",
                config.http.server_name
            );
            HeaderValue::from_static("faas-server")
        });
        Self {
            dispatcher: Dispatcher::new(config),
            keep_alive: config.performance.keep_alive,
            connection_timeout: Duration::from_secs(config.performance.connection_timeout),
            max_connections: config
                .performance
                .max_connections
                .map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
            max_body_size: config.http.max_body_size,
            server_name,
            active_connections: AtomicUsize::new(0),
        }
    }
}

/// Accept a connection unless the connection limit is reached
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    ctx: &Arc<ServerContext>,
    graceful: &GracefulShutdown,
) {
    // Increment counter first, then check limit
    let prev_count = ctx.active_connections.fetch_add(1, Ordering::SeqCst);
    if let Some(max_conn) = ctx.max_connections {
        if prev_count >= max_conn {
            ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Max connections reached: {prev_count}/{max_conn}. Connection rejected.");
            drop(stream);
            return;
        }
    }
    tracing::debug!("Accepted connection from {peer_addr}");

    let service_ctx = Arc::clone(ctx);
    let service = service_fn(move |req| {
        let ctx = Arc::clone(&service_ctx);
        async move { Ok::<_, Infallible>(serve_request(req, &ctx, peer_addr).await) }
    });

    let mut builder = http1::Builder::new();
    builder.keep_alive(ctx.keep_alive);
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    let conn = graceful.watch(conn);

    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        match tokio::time::timeout(ctx.connection_timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => tracing::warn!(
                "Connection from {peer_addr} timed out after {} seconds",
                ctx.connection_timeout.as_secs()
            ),
        }
        ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Adapt one hyper request, dispatch it and stamp the `Server` header
pub async fn serve_request(
    req: Request<Incoming>,
    ctx: &ServerContext,
    peer_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let mut response = match read_request(req, ctx.max_body_size).await {
        Ok(request) => ctx.dispatcher.dispatch(request, Some(peer_addr)).await,
        Err(response) => response,
    };
    response
        .headers_mut()
        .insert(SERVER, ctx.server_name.clone());
    response
}

/// Collect the body up to `max_body_size`; the error is the response to send
async fn read_request<B>(
    req: Request<B>,
    max_body_size: u64,
) -> Result<DispatchRequest, Response<Full<Bytes>>>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(len) = content_length(&req) {
        if len > max_body_size {
            tracing::warn!("Rejected body of {len} bytes (limit {max_body_size})");
            return Err(http::build_413_response(max_body_size));
        }
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(DispatchRequest::from_parts(&parts, collected.to_bytes())),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => {
            tracing::warn!("Rejected streamed body over {max_body_size} bytes");
            Err(http::build_413_response(max_body_size))
        }
        Err(e) => {
            tracing::warn!("Failed to read request body: {e}");
            Err(http::build_400_response())
        }
    }
}

fn content_length<B>(req: &Request<B>) -> Option<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &'static str, content_length: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method("POST").uri("/api/upload?x=1");
        if let Some(len) = content_length {
            builder = builder.header(CONTENT_LENGTH, len);
        }
        builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
    }

    #[tokio::test]
    async fn test_read_request_adapts_parts() {
        let req = read_request(request("hello", Some("5")), 1024).await.unwrap();
        assert_eq!(req.method, hyper::Method::POST);
        assert_eq!(req.target, "/api/upload?x=1");
        assert_eq!(req.path(), "/api/upload");
        assert_eq!(req.body_text(), "hello");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_413() {
        let response = read_request(request("", Some("2048")), 1024).await.unwrap_err();
        assert_eq!(response.status(), 413);
    }

    #[tokio::test]
    async fn test_undeclared_body_over_limit_is_413() {
        let response = read_request(request("0123456789", None), 4).await.unwrap_err();
        assert_eq!(response.status(), 413);
    }
}
