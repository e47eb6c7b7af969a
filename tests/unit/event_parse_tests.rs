//! Unit tests for NDJSON engine event parsing and webhook payload shapes.

use agent_dispatch::adapter::cli::parse_event_line;
use agent_dispatch::adapter::{AdapterEvent, ExecutionOutcome};
use agent_dispatch::models::event::{EventSignal, WebhookEvent};
use agent_dispatch::AppError;

const SID: &str = "s1";

#[test]
fn parses_system_init() {
    let event = parse_event_line(SID, r#"{"event":"system_init","params":{"engine":"engine/2.1"}}"#)
        .expect("valid line")
        .expect("known event");
    assert_eq!(
        event,
        AdapterEvent::SystemInit {
            engine: "engine/2.1".into()
        }
    );
}

#[test]
fn parses_assistant_text() {
    let event = parse_event_line(SID, r#"{"event":"assistant_text","params":{"text":"thinking…"}}"#)
        .expect("valid line")
        .expect("known event");
    assert_eq!(event, AdapterEvent::AssistantText { text: "thinking…".into() });
}

#[test]
fn parses_tool_use_with_arbitrary_input() {
    let event = parse_event_line(
        SID,
        r#"{"event":"tool_use","params":{"name":"edit_file","input":{"path":"src/lib.rs","lines":3}}}"#,
    )
    .expect("valid line")
    .expect("known event");
    match event {
        AdapterEvent::ToolUse { name, input } => {
            assert_eq!(name, "edit_file");
            assert_eq!(input["path"], "src/lib.rs");
            assert_eq!(input["lines"], 3);
        }
        other => panic!("expected ToolUse, got {other:?}"),
    }
}

#[test]
fn parses_question() {
    let event = parse_event_line(
        SID,
        r#"{"event":"question","params":{"id":"q-7","text":"Which schema version?"}}"#,
    )
    .expect("valid line")
    .expect("known event");
    assert_eq!(
        event,
        AdapterEvent::Question {
            id: "q-7".into(),
            text: "Which schema version?".into()
        }
    );
}

#[test]
fn parses_successful_result() {
    let event = parse_event_line(
        SID,
        r#"{"event":"result","params":{"success":true,"summary":"Implemented the fix."}}"#,
    )
    .expect("valid line")
    .expect("known event");
    assert_eq!(
        event,
        AdapterEvent::Completed {
            outcome: ExecutionOutcome::Success {
                summary: "Implemented the fix.".into()
            }
        }
    );
}

#[test]
fn parses_failed_result_with_and_without_detail() {
    let event = parse_event_line(
        SID,
        r#"{"event":"result","params":{"success":false,"error":"compile error"}}"#,
    )
    .expect("valid line")
    .expect("known event");
    assert_eq!(
        event,
        AdapterEvent::Completed {
            outcome: ExecutionOutcome::Failure {
                message: "compile error".into()
            }
        }
    );

    let event = parse_event_line(SID, r#"{"event":"result","params":{"success":false}}"#)
        .expect("valid line")
        .expect("known event");
    assert!(matches!(
        event,
        AdapterEvent::Completed {
            outcome: ExecutionOutcome::Failure { .. }
        }
    ));
}

#[test]
fn result_without_success_flag_is_an_adapter_error() {
    let err = parse_event_line(SID, r#"{"event":"result","params":{"summary":"?"}}"#)
        .expect_err("must fail");
    assert!(matches!(err, AppError::Adapter(_)), "got {err:?}");
}

#[test]
fn unknown_event_is_skipped() {
    let parsed = parse_event_line(SID, r#"{"event":"telemetry","params":{"x":1}}"#)
        .expect("valid line");
    assert!(parsed.is_none());
}

#[test]
fn blank_line_is_skipped() {
    assert!(parse_event_line(SID, "   ").expect("blank ok").is_none());
}

#[test]
fn malformed_json_is_an_adapter_error() {
    let err = parse_event_line(SID, "{not json").expect_err("must fail");
    assert!(matches!(err, AppError::Adapter(_)), "got {err:?}");
}

#[test]
fn missing_required_field_is_an_adapter_error() {
    let err = parse_event_line(SID, r#"{"event":"assistant_text","params":{}}"#)
        .expect_err("must fail");
    assert!(err.to_string().contains("text"), "got {err}");
}

#[test]
fn webhook_event_deserializes_with_optional_fields_absent() {
    let raw = r#"{
        "delivery_id": "d-1",
        "organization_id": "org-1",
        "session_id": "s-1",
        "ticket_id": "T-1"
    }"#;
    let event: WebhookEvent = serde_json::from_str(raw).expect("minimal payload parses");
    assert_eq!(event.delivery_id, "d-1");
    assert!(event.comment.is_none());
    assert!(event.previous_comments.is_none());
    assert!(event.signal.is_none());
}

#[test]
fn webhook_stop_signal_deserializes() {
    let raw = r#"{
        "delivery_id": "d-2",
        "organization_id": "org-1",
        "session_id": "s-1",
        "ticket_id": "T-1",
        "signal": "stop"
    }"#;
    let event: WebhookEvent = serde_json::from_str(raw).expect("stop payload parses");
    assert_eq!(event.signal, Some(EventSignal::Stop));
}
