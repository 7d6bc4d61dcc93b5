//! Line protocol for the dispatch facade
//!
//! Wire format, one JSON document per line:
//!
//! Caller → hypotree (request):
//!   { "id": "req-1", "action": "add_child", "params": { "tree_id": "…", "parent_id": "n0", ... } }
//!
//! hypotree → caller (response):
//!   { "id": "req-1", "ok": true, "result": { "node_id": "n1" } }
//!   { "id": "req-1", "ok": false, "error": { "code": "NODE_NOT_FOUND", "message": "…" } }

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Request line. `id` is echoed back untouched for correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error detail carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn ok(id: Option<String>, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn from_error(id: Option<String>, error: &Error) -> Self {
        Self::err(id, error.code(), error.to_string())
    }

    pub fn from_result(id: Option<String>, result: crate::Result<serde_json::Value>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(e) => Self::from_error(id, &e),
        }
    }

    /// Shorthand for a line that is not a request at all.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::err(None, "MALFORMED_REQUEST", message)
    }
}
