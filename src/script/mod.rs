//! Handler scripting layer
//!
//! Handler files are JavaScript modules run by the embedded `boa_engine`.
//! Everything engine-specific lives here: loading with hot reload, the
//! module export shape, per-invocation console capture and the flattening
//! of script failures into plain Rust data.

mod console;
mod error;
mod loader;
mod module;

pub use console::OutputCapture;
pub use error::ScriptError;
pub use loader::{HandlerLoader, ScriptLimits};
pub use module::{Returned, ScriptResponse};

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Globals evaluated into every handler context before the module itself
const PRELUDE: &str = include_str!("prelude.js");

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Record the process start; later calls are no-ops
pub fn mark_process_start() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Time since [`mark_process_start`], backing `process.uptime()`
pub fn uptime() -> Duration {
    PROCESS_START.get_or_init(Instant::now).elapsed()
}
