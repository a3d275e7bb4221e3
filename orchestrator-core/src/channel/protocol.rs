//! Wire format for the worker channel (spec.md §4.4, §6 "Worker channel
//! protocol"). Every frame is a JSON object discriminated by a `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::worker::Capabilities;

/// Messages the server sends down the channel to a worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        volunteer_id: String,
        message: String,
    },
    Job {
        job_id: String,
        job_type: String,
        code: String,
        input_data: HashMap<String, Value>,
        timeout_seconds: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        wasm_cid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        wasm_url: Option<String>,
    },
    /// Echoed in reply to a `heartbeat`.
    Heartbeat {
        timestamp: i64,
    },
    /// Reserved: no handler is wired end-to-end yet (spec.md §9 open question).
    Cancel {
        job_id: String,
    },
}

/// Messages a worker sends up the channel to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ready {
        #[serde(default)]
        capabilities: Option<Capabilities>,
    },
    Heartbeat,
    Result {
        job_id: String,
        result: Value,
    },
    Error {
        job_id: String,
        error: String,
    },
    Quit,
    /// Anything the worker sends that the server doesn't recognise. Logged
    /// and otherwise ignored (spec.md §4.4 "Any other type").
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_parsed_without_error() {
        let raw = r#"{"type":"ping"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn ready_without_capabilities_defaults_to_none() {
        let raw = r#"{"type":"ready"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Ready { capabilities } => assert!(capabilities.is_none()),
            _ => panic!("expected Ready"),
        }
    }

    #[test]
    fn job_message_serialises_with_type_tag() {
        let msg = ServerMessage::Job {
            job_id: "j1".into(),
            job_type: "lua".into(),
            code: "return 1".into(),
            input_data: HashMap::new(),
            timeout_seconds: 30,
            wasm_cid: None,
            wasm_url: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "job");
        assert!(json.get("wasm_cid").is_none());
    }
}
