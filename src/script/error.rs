//! Script failure description
//!
//! Engine errors are flattened into plain Rust data (`name`, `message`,
//! `stack`) on the thread that owns the context, so they can cross back to
//! the async dispatcher and be classified and logged there.

use boa_engine::{js_string, Context, JsError, JsValue};
use serde::Serialize;

/// A failure raised by handler code or by the engine while running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Flatten an engine error.
    ///
    /// Returns `None` when the script threw `null` or `undefined`; there is no
    /// error to describe in that case. Native errors are read from their
    /// `Kind: message` rendering since runtime-limit errors have no script
    /// object.
    pub fn from_js(err: &JsError, ctx: &mut Context) -> Option<Self> {
        if let Some(native) = err.as_native() {
            let text = native.to_string();
            return Some(match text.split_once(": ") {
                Some((name, message)) => Self::new(name, message),
                None => Self::new(text.as_str(), ""),
            });
        }
        Self::from_thrown(&err.to_opaque(ctx), ctx)
    }

    /// Flatten a thrown value (a rejection reason or an opaque error)
    pub fn from_thrown(value: &JsValue, ctx: &mut Context) -> Option<Self> {
        if value.is_null_or_undefined() {
            return None;
        }

        let Some(obj) = value.as_object() else {
            return Some(Self::new("Error", display_value(value, ctx)));
        };

        let name = property_string(&obj, "name", ctx).unwrap_or_else(|| "Error".to_string());
        let message = property_string(&obj, "message", ctx)
            .unwrap_or_else(|| display_value(value, ctx));
        let stack = property_string(&obj, "stack", ctx);

        Some(Self {
            name,
            message,
            stack,
        })
    }

    /// Lower-cased message, the text the error classifier inspects
    pub fn classification_text(&self) -> String {
        self.message.to_lowercase()
    }

    /// Carry the error name inside the message, as parse failures are
    /// reported at load time (`SyntaxError: ...`)
    pub fn with_name_in_message(mut self) -> Self {
        if !self.message.starts_with(&self.name) {
            self.message = format!("{}: {}", self.name, self.message);
        }
        self
    }
}

fn property_string(obj: &boa_engine::JsObject, key: &str, ctx: &mut Context) -> Option<String> {
    let value = obj.get(js_string!(key), ctx).ok()?;
    if value.is_null_or_undefined() {
        return None;
    }
    value
        .to_string(ctx)
        .ok()
        .map(|s| s.to_std_string_escaped())
}

fn display_value(value: &JsValue, ctx: &mut Context) -> String {
    value
        .to_string(ctx)
        .map_or_else(|_| value.display().to_string(), |s| s.to_std_string_escaped())
}
