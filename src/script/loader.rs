//! Handler loading with revision-tagged hot reload
//!
//! Each load evaluates the file in a brand-new engine context, so no
//! evaluated module state survives between requests. The source text is
//! cached per path together with the [`Revision`] it was read at; a load
//! whose current revision differs from the cached one drops that entry and
//! re-reads the file.
//!
//! Parse failures, of the handler itself or of a module it imports, carry
//! the `SyntaxError` name in their message so they classify as compile
//! errors. An import that names no file reads `Cannot find module '<x>'`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use boa_engine::builtins::promise::PromiseState;
use boa_engine::module::{resolve_module_specifier, ModuleLoader, Referrer, SimpleModuleLoader};
use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsResult, JsString, JsValue, Module, NativeFunction,
    Source,
};

use super::console::{self, OutputCapture};
use super::error::ScriptError;
use super::module::{flatten, HandlerModule};

/// Version tag of a handler file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    modified: Option<SystemTime>,
    len: u64,
}

impl Revision {
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Engine limits applied to every handler context
#[derive(Debug, Clone, Copy)]
pub struct ScriptLimits {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

struct CachedSource {
    revision: Revision,
    text: Arc<str>,
}

pub struct HandlerLoader {
    root: PathBuf,
    limits: ScriptLimits,
    sources: RwLock<HashMap<PathBuf, CachedSource>>,
}

impl HandlerLoader {
    pub fn new(root: PathBuf, limits: ScriptLimits) -> Self {
        Self {
            root,
            limits,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Source text of `path` at its current revision
    pub fn source(&self, path: &Path) -> Result<Arc<str>, ScriptError> {
        let revision = Revision::of(path).map_err(|e| io_error(path, &e))?;

        {
            let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = sources.get(path).filter(|c| c.revision == revision) {
                return Ok(Arc::clone(&cached.text));
            }
        }

        let text: Arc<str> = std::fs::read_to_string(path)
            .map_err(|e| io_error(path, &e))?
            .into();

        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = sources
            .insert(
                path.to_path_buf(),
                CachedSource {
                    revision,
                    text: Arc::clone(&text),
                },
            )
            .is_some();
        drop(sources);

        if replaced {
            tracing::info!("🔄 Reloaded changed handler: {}", path.display());
        } else {
            tracing::debug!("Cached handler source: {}", path.display());
        }
        Ok(text)
    }

    #[cfg(test)]
    pub fn cached_revision(&self, path: &Path) -> Option<Revision> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|c| c.revision)
    }

    /// Evaluate the handler at `path` and collect its exports.
    ///
    /// The error is `None` when the module threw `null` or `undefined`.
    pub fn load(
        &self,
        path: &Path,
        capture: &OutputCapture,
    ) -> Result<HandlerModule, Option<ScriptError>> {
        let source = self.source(path)?;
        tracing::debug!("{} - evaluating {}", capture.tag(), path.display());
        let mut ctx = self.context()?;
        capture.bind(&mut ctx)?;

        let module = Module::parse(
            Source::from_bytes(source.as_bytes()).with_path(path),
            None,
            &mut ctx,
        )
        .map_err(|e| ScriptError::from_js(&e, &mut ctx).map(ScriptError::with_name_in_message))?;

        let promise = module.load_link_evaluate(&mut ctx);
        ctx.run_jobs()
            .map_err(|e| ScriptError::from_js(&e, &mut ctx))?;

        match promise.state() {
            PromiseState::Fulfilled(_) => {}
            PromiseState::Rejected(reason) => {
                return Err(ScriptError::from_thrown(&reason, &mut ctx));
            }
            PromiseState::Pending => {
                return Err(Some(ScriptError::new(
                    "Error",
                    "module evaluation did not complete",
                )));
            }
        }

        let namespace = module.namespace(&mut ctx);
        Ok(HandlerModule::from_namespace(ctx, &namespace)?)
    }

    /// Fresh context with limits, natives and the prelude installed
    fn context(&self) -> Result<Context, ScriptError> {
        let module_loader =
            ImportLoader::new(&self.root).map_err(|e| ScriptError::new("Error", e.to_string()))?;
        let mut ctx = Context::builder()
            .module_loader(Rc::new(module_loader))
            .build()
            .map_err(|e| ScriptError::new("Error", e.to_string()))?;

        let limits = ctx.runtime_limits_mut();
        limits.set_loop_iteration_limit(self.limits.loop_iteration_limit);
        limits.set_recursion_limit(self.limits.recursion_limit);

        ctx.register_global_builtin_callable(
            js_string!("__faas_emit"),
            3,
            NativeFunction::from_fn_ptr(console::emit),
        )
        .map_err(|e| flatten(&e, &mut ctx))?;
        ctx.register_global_builtin_callable(
            js_string!("__faas_uptime"),
            0,
            NativeFunction::from_fn_ptr(uptime),
        )
        .map_err(|e| flatten(&e, &mut ctx))?;

        ctx.eval(Source::from_bytes(super::PRELUDE))
            .map_err(|e| flatten(&e, &mut ctx))?;
        Ok(ctx)
    }
}

/// Resolves `import` specifiers inside handlers.
///
/// Resolution, parsing and caching are delegated to [`SimpleModuleLoader`];
/// this layer only rewrites the failures it reports.
struct ImportLoader {
    root: PathBuf,
    inner: Rc<SimpleModuleLoader>,
}

impl ImportLoader {
    fn new(root: &Path) -> JsResult<Self> {
        let inner = SimpleModuleLoader::new(root)?;
        let root = root.canonicalize().map_err(|e| {
            JsNativeError::typ().with_message(format!("could not set module root: {e}"))
        })?;
        Ok(Self {
            root,
            inner: Rc::new(inner),
        })
    }
}

impl ModuleLoader for ImportLoader {
    async fn load_imported_module(
        self: Rc<Self>,
        referrer: Referrer,
        specifier: JsString,
        context: &RefCell<&mut Context>,
    ) -> JsResult<Module> {
        let resolved = resolve_module_specifier(
            Some(&self.root),
            &specifier,
            referrer.path(),
            &mut context.borrow_mut(),
        );
        if resolved.is_ok_and(|path| !path.is_file()) {
            let name = specifier.to_std_string_escaped();
            return Err(JsNativeError::error()
                .with_message(format!("Cannot find module '{name}'"))
                .into());
        }

        Rc::clone(&self.inner)
            .load_imported_module(referrer, specifier, context)
            .await
            .map_err(name_parse_failure)
    }
}

fn name_parse_failure(err: JsError) -> JsError {
    let message = err.as_native().filter(|n| n.is_syntax()).map(|n| match n.cause() {
        Some(cause) => format!("SyntaxError: {}: {cause}", n.message()),
        None => format!("SyntaxError: {}", n.message()),
    });
    match message {
        Some(message) => JsNativeError::syntax().with_message(message).into(),
        None => err,
    }
}

fn uptime(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(super::uptime().as_secs_f64()))
}

fn io_error(path: &Path, err: &io::Error) -> ScriptError {
    ScriptError::new(
        "Error",
        format!("Cannot read handler {}: {err}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::module::{Export, HttpMethod};

    const LIMITS: ScriptLimits = ScriptLimits {
        loop_iteration_limit: 1_000_000,
        recursion_limit: 256,
    };

    fn write(dir: &Path, rel: &str, code: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, code).unwrap();
        path
    }

    fn capture() -> OutputCapture {
        OutputCapture::new("test01", "GET", "/test")
    }

    #[test]
    fn test_load_collects_callable_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "api/index.js",
            "export function GET() { return new Response('ok'); }\n\
             export const POST = 42;\n\
             export async function DELETE() { return new Response(''); }\n",
        );
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);
        let module = loader.load(&path, &capture()).unwrap();
        let exports = module.exports();
        assert_eq!(exports.available(), vec!["DELETE", "GET"]);
        assert_eq!(exports.select("GET"), Some(Export::Method(HttpMethod::Get)));
        assert_eq!(exports.select("POST"), None);
    }

    #[test]
    fn test_revision_change_replaces_cached_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "index.js", "export default () => new Response('one');");
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);

        let first = loader.source(&path).unwrap();
        let first_revision = loader.cached_revision(&path).unwrap();
        assert!(first.contains("'one'"));

        write(dir.path(), "index.js", "export default () => new Response('second version');");
        let second = loader.source(&path).unwrap();
        assert!(second.contains("'second version'"));
        assert_ne!(loader.cached_revision(&path).unwrap(), first_revision);
    }

    #[test]
    fn test_unchanged_revision_reuses_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "index.js", "export default () => new Response('x');");
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);

        let first = loader.source(&path).unwrap();
        let second = loader.source(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_top_level_throw_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "index.js", "throw new Error('init exploded');");
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);

        let err = loader.load(&path, &capture()).err().flatten().unwrap();
        assert_eq!(err.message, "init exploded");
    }

    #[test]
    fn test_syntax_error_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "index.js", "export function GET( { return 1; }");
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);

        let err = loader.load(&path, &capture()).err().flatten().unwrap();
        assert_eq!(err.name, "SyntaxError");
        assert!(err.message.starts_with("SyntaxError: "));
    }

    #[test]
    fn test_missing_import_reads_cannot_find_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "api/imp/index.js",
            "import { x } from './missing.js';\n\
             export function GET() { return new Response(x); }",
        );
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);
        let err = loader.load(&path, &capture()).err().flatten().unwrap();
        assert_eq!(err.message, "Cannot find module './missing.js'");
    }

    #[test]
    fn test_unparseable_import_is_named_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "shared/broken.js", "export const = ;");
        let path = write(
            dir.path(),
            "api/index.js",
            "import { y } from '../shared/broken.js';\n\
             export default () => new Response(y);",
        );
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);
        let err = loader.load(&path, &capture()).err().flatten().unwrap();
        assert!(err.message.starts_with("SyntaxError: could not parse module"));
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);
        let err = loader
            .load(&dir.path().join("gone/index.js"), &capture())
            .err()
            .flatten()
            .unwrap();
        assert!(err.message.contains("Cannot read handler"));
    }

    #[test]
    fn test_relative_import_resolves_from_handler_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "shared/greet.js", "export const greet = (n) => `hi ${n}`;");
        let path = write(
            dir.path(),
            "api/hello/index.js",
            "import { greet } from '../../shared/greet.js';\n\
             export function GET() { return new Response(greet('there')); }",
        );
        let loader = HandlerLoader::new(dir.path().to_path_buf(), LIMITS);
        let module = loader.load(&path, &capture()).unwrap();
        assert_eq!(module.exports().available(), vec!["GET"]);
    }
}
