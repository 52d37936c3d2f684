//! The queued invocation envelope handed over by the gateway.

use crate::serde_util::{base64_bytes, null_as_default};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP-style headers: name to every value sent under it.
pub type Header = BTreeMap<String, Vec<String>>;

/// A request to run a function later, off the synchronous path.
///
/// Field names on the wire match what the queue worker decodes, so they keep
/// the gateway's capitalised spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub header: Header,
    #[serde(default)]
    pub host: String,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query_string: String,
    /// Target function name, optionally `name.namespace`.
    pub function: String,
    /// Queue to publish to instead of the publisher's default topic.
    #[serde(default)]
    pub queue_name: String,
    /// Where the worker should post the function's response.
    #[serde(rename = "CallbackUrl", default)]
    pub callback_url: Option<String>,
}

impl InvocationRequest {
    /// Create a `POST` request for `function` carrying `body`.
    pub fn new(function: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            function: function.into(),
            body: body.into(),
            method: "POST".to_string(),
            ..Default::default()
        }
    }

    pub fn with_queue_name(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = queue.into();
        self
    }

    /// Append a header value, keeping any values already present.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// The per-request queue override, if one was given.
    pub fn queue_override(&self) -> Option<&str> {
        Some(self.queue_name.as_str()).filter(|q| !q.is_empty())
    }

    /// First value of header `name`, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}
