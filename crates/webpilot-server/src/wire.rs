//! JSON wire protocol: inbound frame decoding and outbound frame encoding.

use serde::Serialize;
use serde_json::Value;

use webpilot_core::errors::ProtocolError;
use webpilot_core::ids::{ConnectionId, SessionId, TaskId};
use webpilot_core::plan::TaskPlan;

/// Closed set of inbound message shapes. Unrecognized `type` tags decode into
/// `Unknown` so the protocol layer can answer with a structured error instead
/// of dropping the connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Init { session_id: Option<SessionId> },
    RestoreSession { session_id: SessionId },
    AnalyzeTask { task: String },
    ExecuteCommand { command: String, task_id: Option<TaskId> },
    BrowserState { state: Value },
    Unknown { msg_type: String },
}

/// Parse a transport frame. `Decode` only for invalid JSON, a non-object
/// frame, or a missing/non-string `type`; a well-formed tag with a missing
/// required field is `Validation`.
pub fn decode(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ProtocolError::Decode("frame is not a JSON object".into()))?;
    let msg_type = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::Decode("missing type field".into()))?;

    match msg_type {
        "INIT" => Ok(Inbound::Init {
            session_id: optional_str(obj, "sessionId").map(SessionId::from_raw),
        }),
        "RESTORE_SESSION" => Ok(Inbound::RestoreSession {
            session_id: SessionId::from_raw(require_str(obj, "sessionId")?),
        }),
        "ANALYZE_TASK" => Ok(Inbound::AnalyzeTask {
            task: require_str(obj, "task")?.to_string(),
        }),
        "EXECUTE_COMMAND" => Ok(Inbound::ExecuteCommand {
            command: require_str(obj, "command")?.to_string(),
            task_id: optional_str(obj, "taskId").map(TaskId::from_raw),
        }),
        "BROWSER_STATE" => Ok(Inbound::BrowserState {
            state: obj.get("state").cloned().unwrap_or(Value::Null),
        }),
        other => Ok(Inbound::Unknown {
            msg_type: other.to_string(),
        }),
    }
}

fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a str, ProtocolError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProtocolError::Validation(format!("{key} is required")))
}

fn optional_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Outbound message envelopes.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "CONNECTION_ESTABLISHED")]
    ConnectionEstablished {
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
        timestamp: String,
    },
    #[serde(rename = "SESSION_INIT")]
    SessionInit {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "SESSION_RESTORED")]
    SessionRestored {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "TASK_PLAN")]
    TaskPlanReady {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        plan: TaskPlan,
    },
    #[serde(rename = "ERROR")]
    Error { error: String },
}

/// Encode an outbound frame. Infallible for well-formed values; the caller's
/// contract guarantees all fields serialize.
pub fn encode(msg: &Outbound) -> String {
    serde_json::to_string(msg).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode outbound frame");
        r#"{"type":"ERROR","error":"internal encoding failure"}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_core::plan::Step;

    #[test]
    fn decode_init_with_session_id() {
        let msg = decode(r#"{"type":"INIT","sessionId":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Init {
                session_id: Some(SessionId::from_raw("abc"))
            }
        );
    }

    #[test]
    fn decode_init_without_session_id() {
        let msg = decode(r#"{"type":"INIT"}"#).unwrap();
        assert_eq!(msg, Inbound::Init { session_id: None });
    }

    #[test]
    fn decode_restore_session() {
        let msg = decode(r#"{"type":"RESTORE_SESSION","sessionId":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::RestoreSession {
                session_id: SessionId::from_raw("abc")
            }
        );
    }

    #[test]
    fn restore_session_without_session_id_is_validation_error() {
        let err = decode(r#"{"type":"RESTORE_SESSION"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
        assert_eq!(err.client_message(), "sessionId is required");
    }

    #[test]
    fn decode_analyze_task() {
        let msg = decode(r#"{"type":"ANALYZE_TASK","task":"open example.com"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::AnalyzeTask {
                task: "open example.com".into()
            }
        );
    }

    #[test]
    fn analyze_task_requires_task() {
        let err = decode(r#"{"type":"ANALYZE_TASK"}"#).unwrap_err();
        assert_eq!(err.client_message(), "task is required");
    }

    #[test]
    fn decode_execute_command_with_task_id() {
        let msg =
            decode(r#"{"type":"EXECUTE_COMMAND","command":"search rust","taskId":"t1"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::ExecuteCommand {
                command: "search rust".into(),
                task_id: Some(TaskId::from_raw("t1")),
            }
        );
    }

    #[test]
    fn execute_command_requires_command() {
        let err = decode(r#"{"type":"EXECUTE_COMMAND","taskId":"t1"}"#).unwrap_err();
        assert_eq!(err.client_message(), "command is required");
    }

    #[test]
    fn decode_browser_state() {
        let msg = decode(r#"{"type":"BROWSER_STATE","state":{"url":"https://a.com"}}"#).unwrap();
        match msg {
            Inbound::BrowserState { state } => assert_eq!(state["url"], "https://a.com"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_decodes_to_unknown_variant() {
        let msg = decode(r#"{"type":"BOGUS"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Unknown {
                msg_type: "BOGUS".into()
            }
        );
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let err = decode("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn non_object_frame_is_decode_error() {
        let err = decode(r#"[1,2,3]"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn missing_type_field_is_decode_error() {
        let err = decode(r#"{"task":"open example.com"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn non_string_type_is_decode_error() {
        let err = decode(r#"{"type":42}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn encode_connection_established() {
        let json = encode(&Outbound::ConnectionEstablished {
            client_id: ConnectionId::from_raw("conn_1"),
            timestamp: "2026-08-26T00:00:00Z".into(),
        });
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "CONNECTION_ESTABLISHED");
        assert_eq!(value["clientId"], "conn_1");
        assert_eq!(value["timestamp"], "2026-08-26T00:00:00Z");
    }

    #[test]
    fn encode_session_frames() {
        let json = encode(&Outbound::SessionInit {
            session_id: SessionId::from_raw("A"),
        });
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "SESSION_INIT");
        assert_eq!(value["sessionId"], "A");

        let json = encode(&Outbound::SessionRestored {
            session_id: SessionId::from_raw("B"),
        });
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "SESSION_RESTORED");
        assert_eq!(value["sessionId"], "B");
    }

    #[test]
    fn encode_task_plan_matches_wire_shape() {
        let plan = TaskPlan::new(vec![
            Step::new("navigate").with_param("url", serde_json::json!("https://example.com")),
        ]);
        let json = encode(&Outbound::TaskPlanReady {
            task_id: TaskId::from_raw("t1"),
            plan,
        });
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "TASK_PLAN");
        assert_eq!(value["taskId"], "t1");
        assert_eq!(value["plan"]["steps"][0]["action"], "navigate");
        assert_eq!(value["plan"]["steps"][0]["params"]["url"], "https://example.com");
    }

    #[test]
    fn encode_error() {
        let json = encode(&Outbound::Error {
            error: "unknown message type".into(),
        });
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["error"], "unknown message type");
    }
}
