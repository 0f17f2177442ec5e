//! IPC message types for daemon communication
//!
//! Each message is a single line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::correlator::{CorrelatorStatus, Outcome, RequestKind};

/// Messages from CLI to Daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    /// Issue a device command on behalf of `user`
    Command { kind: RequestKind, user: String },

    /// Ask for the correlator status
    Status,

    /// Request daemon to stop gracefully
    Shutdown,
}

/// Responses from Daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Acknowledgment
    Ok,

    /// Rendered reply for a command, plus the raw outcome
    Reply { text: String, outcome: Outcome },

    Status { status: CorrelatorStatus, version: String },

    /// Error response
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialize() {
        let msg = DaemonMessage::Command {
            kind: RequestKind::TurnOn,
            user: "alice".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"Command","kind":"turn-on","user":"alice"}"#);
    }

    #[test]
    fn test_command_deserialize() {
        let json = r#"{"type":"Command","kind":"ping","user":"bob"}"#;
        let msg: DaemonMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            DaemonMessage::Command {
                kind: RequestKind::Ping,
                user: "bob".to_string(),
            }
        );
    }

    #[test]
    fn test_unit_messages_serialize() {
        assert_eq!(serde_json::to_string(&DaemonMessage::Status).unwrap(), r#"{"type":"Status"}"#);
        assert_eq!(
            serde_json::to_string(&DaemonMessage::Shutdown).unwrap(),
            r#"{"type":"Shutdown"}"#
        );
        assert_eq!(serde_json::to_string(&DaemonResponse::Ok).unwrap(), r#"{"type":"Ok"}"#);
    }

    #[test]
    fn test_reply_response_carries_outcome() {
        let resp = DaemonResponse::Reply {
            text: "Pong! (12 ms)".to_string(),
            outcome: Outcome::Acknowledged {
                payload: "ACK ping".to_string(),
                latency_ms: 12,
            },
        };
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "Reply");
        assert_eq!(value["text"], "Pong! (12 ms)");
        assert_eq!(value["outcome"]["outcome"], "Acknowledged");
        assert_eq!(value["outcome"]["latency-ms"], 12);

        let parsed: DaemonResponse = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = DaemonResponse::Error {
            message: "Something went wrong".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"Error","message":"Something went wrong"}"#);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type":"Launch"}"#;
        assert!(serde_json::from_str::<DaemonMessage>(json).is_err());
    }
}
