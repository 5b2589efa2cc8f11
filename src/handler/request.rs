//! Transport-neutral request handed to the dispatcher

use std::borrow::Cow;
use std::collections::BTreeMap;

use hyper::body::Bytes;
use hyper::header::USER_AGENT;
use hyper::{HeaderMap, Method};

/// One inbound request; immutable for the duration of a dispatch
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    /// Path plus optional `?query`, as received
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DispatchRequest {
    pub fn new(method: Method, target: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            target: target.into(),
            headers,
            body,
        }
    }

    pub fn from_parts(parts: &hyper::http::request::Parts, body: Bytes) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        Self::new(parts.method.clone(), target, parts.headers.clone(), body)
    }

    /// Target with the query suffix stripped
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Header names (lower case) to values; repeated headers joined with `", "`
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes());
            map.entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert_with(|| value.to_string());
        }
        map
    }

    /// The body decoded as UTF-8 (lossy); handlers also get the raw bytes
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }
}
