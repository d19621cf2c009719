//! Hot reload message protocol.
//!
//! # Host → client
//!
//! - `{"type":"full-reload"}`
//! - `{"type":"css","file":"/app.css","code":"..."}`
//! - `{"id":"7","src":"/@lumen/patch/7.js","args":[...]}` evaluation request
//!
//! # Client → host
//!
//! - `{"type":"result","id":"7","result":...}` answers an evaluation; the
//!   id is an opaque string echoed back as received
//! - `{"type":<other>,...}` republished on the event bus

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broadcast message with a fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HotMessage {
    /// Reload every page (or extension runtime).
    FullReload,

    /// Replace the stylesheet served at `file` with `code`.
    Css { file: String, code: String },
}

impl HotMessage {
    pub fn css(file: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Css {
            file: file.into(),
            code: code.into(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"full-reload"}"#.to_string())
    }
}

/// Ask one client to `import(src)` and call its default export with `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub id: String,
    pub src: String,
    pub args: Value,
}

impl EvaluateRequest {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A parsed client → host message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to an evaluation request.
    Result { id: String, result: Value },
    /// Anything else, keyed by its `type`.
    Event { kind: String, payload: Value },
}

impl Inbound {
    /// Parse inbound text. Messages without a string `type` are dropped.
    pub fn parse(text: &str) -> Option<Self> {
        let payload: Value = serde_json::from_str(text).ok()?;
        let kind = payload.get("type")?.as_str()?.to_string();

        if kind == "result" {
            let id = payload.get("id")?.as_str()?.to_string();
            let result = payload.get("result").cloned().unwrap_or(Value::Null);
            return Some(Self::Result { id, result });
        }
        Some(Self::Event { kind, payload })
    }
}
