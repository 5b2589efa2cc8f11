//! Per-invocation console capture
//!
//! Handler code writes through `console.*`. Every invocation owns its own
//! engine context, so its console is bound to that request alone and feeds
//! the structured logger; no process-wide stream is ever swapped. The Rust
//! side of the invocation runs inside a `handler` span that is exited by
//! guard drop on every exit path.

use boa_engine::{js_string, Context, JsResult, JsValue};

use super::error::ScriptError;

/// Console channel a handler wrote to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub fn parse(level: &str) -> Self {
        match level {
            "debug" => Self::Debug,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Indentation and marker that set handler output apart from server lines
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Debug | Self::Info => "    📝 ",
            Self::Warn => "    ⚠️  ",
            Self::Error => "    ❌ ",
        }
    }
}

/// Scoped capture of one handler invocation's diagnostic output
pub struct OutputCapture {
    tag: String,
    span: tracing::Span,
}

impl OutputCapture {
    pub fn new(request_id: &str, method: &str, path: &str) -> Self {
        Self {
            tag: format!("[{request_id}] {method} {path}"),
            span: tracing::info_span!("handler", id = %request_id, method = %method, path = %path),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Point `console` of this context at the logger, tagged with this request
    pub fn bind(&self, ctx: &mut Context) -> Result<(), ScriptError> {
        let bind = ctx
            .global_object()
            .get(js_string!("__faas_bind_console"), ctx)
            .map_err(|e| describe(&e, ctx))?;
        let bind = bind
            .as_callable()
            .ok_or_else(|| ScriptError::new("Error", "console binding is not installed"))?;
        bind.call(
            &JsValue::undefined(),
            &[JsValue::from(js_string!(self.tag.as_str()))],
            ctx,
        )
        .map_err(|e| describe(&e, ctx))?;
        Ok(())
    }

    /// Run `f` with the capture span entered; the span is exited when `f`
    /// returns, fails or unwinds.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let _entered = self.span.enter();
        f()
    }

    #[cfg(test)]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

fn describe(err: &boa_engine::JsError, ctx: &mut Context) -> ScriptError {
    ScriptError::from_js(err, ctx)
        .unwrap_or_else(|| ScriptError::new("Error", "console binding failed"))
}

/// Native sink behind every console channel: `__faas_emit(level, tag, text)`
pub(super) fn emit(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let mut arg = |i: usize| -> JsResult<String> {
        match args.get(i) {
            Some(v) => Ok(v.to_string(ctx)?.to_std_string_escaped()),
            None => Ok(String::new()),
        }
    };
    let level = ConsoleLevel::parse(&arg(0)?);
    let tag = arg(1)?;
    let text = arg(2)?;
    let prefix = level.prefix();

    match level {
        ConsoleLevel::Debug => tracing::debug!("{tag} -{prefix}{text}"),
        ConsoleLevel::Info => tracing::info!("{tag} -{prefix}{text}"),
        ConsoleLevel::Warn => tracing::warn!("{tag} -{prefix}{text}"),
        ConsoleLevel::Error => tracing::error!("{tag} -{prefix}{text}"),
    }
    Ok(JsValue::undefined())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DispatchRequest;
    use crate::script::loader::{HandlerLoader, ScriptLimits};
    use hyper::body::Bytes;
    use hyper::{HeaderMap, Method};
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;

    /// Formatted log output shared between threads
    #[derive(Clone, Default)]
    struct Lines(Arc<Mutex<Vec<u8>>>);

    impl Lines {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Lines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Lines {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Load the handler at `path` under `capture` and call it for GET
    fn run(loader: &HandlerLoader, path: &Path, capture: &OutputCapture, target: &str) {
        capture.scope(|| {
            let mut module = loader.load(path, capture).unwrap();
            let export = module.exports().select("GET").unwrap();
            let request = DispatchRequest::new(Method::GET, target, HeaderMap::new(), Bytes::new());
            module.invoke(export, &request).unwrap();
        });
    }

    #[test]
    fn test_level_parsing_and_prefixes() {
        assert_eq!(ConsoleLevel::parse("warn"), ConsoleLevel::Warn);
        assert_eq!(ConsoleLevel::parse("error"), ConsoleLevel::Error);
        assert_eq!(ConsoleLevel::parse("log"), ConsoleLevel::Info);
        assert_eq!(ConsoleLevel::Info.prefix(), "    📝 ");
        assert_eq!(ConsoleLevel::Warn.prefix(), "    ⚠️  ");
        assert_eq!(ConsoleLevel::Error.prefix(), "    ❌ ");
    }

    #[test]
    fn test_tag_names_request() {
        let capture = OutputCapture::new("a1b2c3", "GET", "/api/users");
        assert_eq!(capture.tag(), "[a1b2c3] GET /api/users");
    }

    #[test]
    fn test_scope_exits_span_on_panic() {
        let subscriber = tracing_subscriber::registry();
        tracing::subscriber::with_default(subscriber, || {
            let capture = OutputCapture::new("a1b2c3", "GET", "/x");
            let inside = capture.scope(|| tracing::Span::current().id());
            assert_eq!(inside, capture.span().id());

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                capture.scope(|| panic!("handler blew up"));
            }));
            assert!(result.is_err());
            assert_ne!(tracing::Span::current().id(), capture.span().id());
        });
    }

    #[test]
    fn test_scope_exits_span_on_error() {
        let subscriber = tracing_subscriber::registry().with(tracing_subscriber::fmt::layer());
        tracing::subscriber::with_default(subscriber, || {
            let capture = OutputCapture::new("d4e5f6", "POST", "/y");
            let result: Result<(), &str> = capture.scope(|| Err("failed"));
            assert!(result.is_err());
            assert!(tracing::Span::current().id().is_none());
        });
    }

    #[test]
    fn test_handler_console_reaches_logger_with_request_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.js");
        std::fs::write(
            &path,
            "export function GET(req) {\n\
               console.log('hello', { path: req.path });\n\
               console.warn('careful');\n\
               console.error('bad thing');\n\
               return new Response('ok');\n\
             }",
        )
        .unwrap();
        let loader = HandlerLoader::new(
            dir.path().to_path_buf(),
            ScriptLimits {
                loop_iteration_limit: 1_000_000,
                recursion_limit: 256,
            },
        );

        let lines = Lines::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(lines.clone())
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .finish();
        let dispatch = tracing::Dispatch::new(subscriber);

        std::thread::scope(|scope| {
            for (id, target) in [("aaaaaa", "/one"), ("bbbbbb", "/two")] {
                let (loader, path, dispatch) = (&loader, &path, &dispatch);
                scope.spawn(move || {
                    tracing::dispatcher::with_default(dispatch, || {
                        let capture = OutputCapture::new(id, "GET", target);
                        run(loader, path, &capture, target);
                    });
                });
            }
        });

        let output = lines.text();
        for (id, target) in [("aaaaaa", "/one"), ("bbbbbb", "/two")] {
            let tag = format!("[{id}] GET {target} -");
            let line = |needle: &str| {
                output
                    .lines()
                    .find(|l| l.contains(&tag) && l.contains(needle))
                    .unwrap_or_else(|| panic!("no line for {tag} {needle}:\n{output}"))
                    .to_string()
            };

            let info = line("📝");
            assert!(info.contains("INFO"));
            assert!(info.contains(&format!("{tag}    📝 hello {{\"path\":\"{target}\"}}")));
            let warn = line("careful");
            assert!(warn.contains("WARN"));
            assert!(warn.contains(&format!("{tag}    ⚠️  careful")));
            let error = line("bad thing");
            assert!(error.contains("ERROR"));
            assert!(error.contains(&format!("{tag}    ❌ bad thing")));

            // each line sits in its own request's span and names no other request
            for l in [info, warn, error] {
                assert!(l.contains(&format!("id={id}")));
                let other = if id == "aaaaaa" { "bbbbbb" } else { "aaaaaa" };
                assert!(!l.contains(other));
            }
        }
    }
}
