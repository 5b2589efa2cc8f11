//! Handler module shape and method selection
//!
//! A loaded handler file is modeled as the set of callable exports it
//! provides over a closed enumeration (`default` plus the seven HTTP methods).
//! Selection is a pure function over that set; [`HandlerModule`] keeps the
//! engine objects behind it and performs the invocation.

use std::collections::BTreeMap;
use std::fmt;

use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::{JsPromise, JsUint8Array};
use boa_engine::{js_string, Context, JsObject, JsValue};
use serde::Deserialize;

use super::error::ScriptError;
use crate::handler::request::DispatchRequest;

/// HTTP methods a handler module may export
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Options,
        Self::Head,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }

    /// Exact, case-sensitive match against an export or request method name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

/// One export slot of a handler module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Export {
    Default,
    Method(HttpMethod),
}

impl Export {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Method(m) => m.as_str(),
        }
    }

    fn all() -> impl Iterator<Item = Self> {
        std::iter::once(Self::Default).chain(HttpMethod::ALL.into_iter().map(Self::Method))
    }
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callable exports present on a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSet {
    default: bool,
    methods: Vec<HttpMethod>,
}

impl ExportSet {
    pub fn from_exports(exports: impl IntoIterator<Item = Export>) -> Self {
        let mut set = Self::default();
        for export in exports {
            match export {
                Export::Default => set.default = true,
                Export::Method(m) if !set.methods.contains(&m) => set.methods.push(m),
                Export::Method(_) => {}
            }
        }
        set
    }

    /// `default` wins over everything; otherwise the export named exactly like
    /// the request method.
    pub fn select(&self, method: &str) -> Option<Export> {
        if self.default {
            return Some(Export::Default);
        }
        HttpMethod::parse(method)
            .filter(|m| self.methods.contains(m))
            .map(Export::Method)
    }

    /// Method-shaped exports in module namespace order (sorted by name)
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .methods
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();
        if self.default {
            names.push(Export::Default.name().to_string());
        }
        names.sort();
        names
    }
}

/// Well-formed response produced by a handler
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptResponse {
    pub status: Option<f64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// What a completed handler call handed back
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Returned {
    Response(ScriptResponse),
    /// Anything that is not a `Response`; carries the JS type name
    Invalid(String),
}

/// An evaluated handler file bound to its own engine context
pub struct HandlerModule {
    ctx: Context,
    functions: BTreeMap<Export, JsObject>,
}

impl HandlerModule {
    /// Collect the callable exports of an evaluated module namespace
    pub(super) fn from_namespace(
        mut ctx: Context,
        namespace: &JsObject,
    ) -> Result<Self, ScriptError> {
        let mut functions = BTreeMap::new();
        for export in Export::all() {
            let value = namespace
                .get(js_string!(export.name()), &mut ctx)
                .map_err(|e| flatten(&e, &mut ctx))?;
            if let Some(function) = value.as_callable() {
                functions.insert(export, JsObject::clone(&function));
            }
        }
        Ok(Self { ctx, functions })
    }

    pub fn exports(&self) -> ExportSet {
        ExportSet::from_exports(self.functions.keys().copied())
    }

    /// Call the selected export with the request and settle its result
    pub fn invoke(
        &mut self,
        export: Export,
        request: &DispatchRequest,
    ) -> Result<Returned, Option<ScriptError>> {
        let function = self.functions.get(&export).cloned().ok_or_else(|| {
            Some(ScriptError::new(
                "Error",
                format!("export '{export}' is not a function"),
            ))
        })?;

        let js_request = self.make_request(request)?;
        let ctx = &mut self.ctx;
        let returned = function
            .call(&JsValue::undefined(), &[js_request], ctx)
            .map_err(|e| ScriptError::from_js(&e, ctx))?;
        let settled = settle(returned, ctx)?;
        describe(&settled, ctx)
    }

    fn make_request(&mut self, request: &DispatchRequest) -> Result<JsValue, Option<ScriptError>> {
        let ctx = &mut self.ctx;
        let headers_json = serde_json::to_string(&request.header_map())
            .map_err(|e| Some(ScriptError::new("Error", e.to_string())))?;
        let body = request.body_text();
        let bytes = JsUint8Array::from_iter(request.body.iter().copied(), ctx)
            .map_err(|e| Some(flatten(&e, ctx)))?;
        let args = [
            JsValue::from(js_string!(request.method.as_str())),
            JsValue::from(js_string!(request.target.as_str())),
            JsValue::from(js_string!(request.path())),
            JsValue::from(js_string!(request.query().unwrap_or_default())),
            JsValue::from(js_string!(headers_json.as_str())),
            JsValue::from(js_string!(&*body)),
            JsValue::from(bytes),
        ];
        call_global(ctx, "__faas_make_request", &args).map_err(Some)
    }
}

/// Drain the job queue and unwrap a promise; plain values pass through
fn settle(value: JsValue, ctx: &mut Context) -> Result<JsValue, Option<ScriptError>> {
    let promise = value
        .as_object()
        .and_then(|obj| JsPromise::from_object(JsObject::clone(&obj)).ok());
    let Some(promise) = promise else {
        return Ok(value);
    };

    ctx.run_jobs().map_err(|e| ScriptError::from_js(&e, ctx))?;
    match promise.state() {
        PromiseState::Fulfilled(v) => Ok(v),
        PromiseState::Rejected(reason) => Err(ScriptError::from_thrown(&reason, ctx)),
        PromiseState::Pending => Err(Some(ScriptError::new(
            "Error",
            "handler promise never settled",
        ))),
    }
}

fn describe(value: &JsValue, ctx: &mut Context) -> Result<Returned, Option<ScriptError>> {
    let described = call_global(ctx, "__faas_describe", std::slice::from_ref(value)).map_err(Some)?;
    let text = described
        .to_string(ctx)
        .map_err(|e| ScriptError::from_js(&e, ctx))?
        .to_std_string_escaped();
    serde_json::from_str(&text).map_err(|e| Some(ScriptError::new("Error", e.to_string())))
}

/// Call a function installed on the global object by the prelude
pub(super) fn call_global(
    ctx: &mut Context,
    name: &str,
    args: &[JsValue],
) -> Result<JsValue, ScriptError> {
    let value = ctx
        .global_object()
        .get(js_string!(name), ctx)
        .map_err(|e| flatten(&e, ctx))?;
    let function = value
        .as_callable()
        .ok_or_else(|| ScriptError::new("Error", format!("{name} is not installed")))?;
    function
        .call(&JsValue::undefined(), args, ctx)
        .map_err(|e| flatten(&e, ctx))
}

/// Like [`ScriptError::from_js`], for engine-internal failures that must
/// always carry a description
pub(super) fn flatten(err: &boa_engine::JsError, ctx: &mut Context) -> ScriptError {
    ScriptError::from_js(err, ctx).unwrap_or_else(|| ScriptError::new("Error", err.to_string()))
}
