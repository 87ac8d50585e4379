//! Canned response descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status returned by a mock when none is given.
pub const HTTP_SUCCESS: u16 = 200;

/// Simulated transport-level metadata. All fields are empty for a mock,
/// which tells the caller no transport error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub errno: String,
    pub error: String,
}

impl TransportMeta {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.errno.is_empty() && self.error.is_empty()
    }
}

/// A response handed back in place of a real network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    /// Verb of the request this response was registered for.
    pub verb: String,
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub status: u16,
    #[serde(flatten)]
    pub transport: TransportMeta,
}

impl MockResponse {
    pub fn new(verb: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            verb: verb.into(),
            body,
            headers: HashMap::new(),
            status: HTTP_SUCCESS,
            transport: TransportMeta::default(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}
