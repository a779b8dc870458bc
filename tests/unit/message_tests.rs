//! Unit tests for JSON-RPC envelope encoding and inbound classification.

use serde_json::{json, Value};

use agent_conduit::acp::message::{
    decode_inbound, detect_method, encode_line, Inbound, JsonRpcError, Notification, Request,
    RequestId, Response,
};
use agent_conduit::acp::schema::{ContentBlock, PromptRequest, SessionId, SessionNotification};
use agent_conduit::AppError;

fn parse(line: &[u8]) -> Value {
    let body = line.strip_suffix(b"\n").expect("line ends with newline");
    serde_json::from_slice(body).expect("valid json")
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Requests carry the version tag, id, method and params.
#[test]
fn request_encodes_all_fields() {
    let line = Request {
        id: RequestId::Number(7),
        method: "session/new".into(),
        params: Some(json!({ "cwd": "/w", "mcpServers": [] })),
    }
    .encode_line()
    .expect("encode");

    assert_eq!(
        parse(&line),
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "session/new",
            "params": { "cwd": "/w", "mcpServers": [] }
        })
    );
}

/// Absent params are omitted rather than sent as null.
#[test]
fn absent_params_are_omitted() {
    let line = Notification {
        method: "session/cancel".into(),
        params: None,
    }
    .encode_line()
    .expect("encode");
    assert_eq!(parse(&line), json!({ "jsonrpc": "2.0", "method": "session/cancel" }));
}

/// Error responses carry `error` and no `result`.
#[test]
fn error_response_encoding() {
    let line = Response::failure(
        RequestId::Str("agent-1".into()),
        JsonRpcError {
            code: -32601,
            message: "Method not found: x".into(),
            data: None,
        },
    )
    .encode_line()
    .expect("encode");

    let value = parse(&line);
    assert_eq!(value["id"], "agent-1");
    assert_eq!(value["error"]["code"], -32601);
    assert!(value.get("result").is_none());
}

/// Newlines inside string content are escaped; the only 0x0A is the terminator.
#[test]
fn encoded_line_has_single_newline() {
    let line = Request {
        id: RequestId::Number(1),
        method: "session/prompt".into(),
        params: Some(json!({ "text": "line one\nline two\r\n\tend" })),
    }
    .encode_line()
    .expect("encode");

    assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    assert_eq!(line.last(), Some(&b'\n'));
    assert_eq!(parse(&line)["params"]["text"], "line one\nline two\r\n\tend");
}

/// Forward slashes are not escaped.
#[test]
fn slashes_stay_unescaped() {
    let line = encode_line(&json!({ "method": "fs/read_text_file", "path": "/a/b" }))
        .expect("encode");
    let text = String::from_utf8(line).expect("utf-8");
    assert!(text.contains("fs/read_text_file"));
    assert!(text.contains("\"/a/b\""));
    assert!(!text.contains("\\/"));
}

/// Typed payloads use the protocol's camelCase field names.
#[test]
fn typed_params_use_camel_case() {
    let params = serde_json::to_value(PromptRequest {
        session_id: SessionId::from("s-1"),
        prompt: vec![ContentBlock::text("hi")],
    })
    .expect("serialise");
    assert_eq!(
        params,
        json!({ "sessionId": "s-1", "prompt": [{ "type": "text", "text": "hi" }] })
    );
}

// ── Classification ───────────────────────────────────────────────────────────

/// `id` plus `result` is a success response.
#[test]
fn result_with_id_is_response() {
    let inbound = decode_inbound(br#"{"jsonrpc":"2.0","id":4,"result":{"ok":true}}"#)
        .expect("decode");
    assert_eq!(
        inbound,
        Inbound::Response(Response::success(RequestId::Number(4), json!({ "ok": true })))
    );
}

/// `id` plus `error` is an error response.
#[test]
fn error_with_id_is_response() {
    let inbound = decode_inbound(
        br#"{"jsonrpc":"2.0","id":"x","error":{"code":-32000,"message":"boom","data":{"details":"d"}}}"#,
    )
    .expect("decode");
    let Inbound::Response(response) = inbound else {
        panic!("expected response");
    };
    assert_eq!(response.id, RequestId::Str("x".into()));
    let err = response.outcome.expect_err("error outcome");
    assert_eq!(err.code, -32000);
    assert_eq!(err.data, Some(json!({ "details": "d" })));
}

/// A `method` without `id` is a notification.
#[test]
fn method_without_id_is_notification() {
    let inbound = decode_inbound(
        br#"{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s","update":{"sessionUpdate":"agent_message_chunk"}}}"#,
    )
    .expect("decode");
    let Inbound::Notification(notification) = inbound else {
        panic!("expected notification");
    };
    assert_eq!(notification.method, "session/update");
    let update: SessionNotification = notification.params_as().expect("typed params");
    assert_eq!(update.session_id.as_str(), "s");
    assert_eq!(update.kind(), Some("agent_message_chunk"));
}

/// `method` plus `id` is an agent request.
#[test]
fn method_with_id_is_request() {
    let inbound = decode_inbound(
        br#"{"jsonrpc":"2.0","id":"agent-9","method":"fs/read_text_file","params":{"path":"/a"}}"#,
    )
    .expect("decode");
    assert_eq!(
        inbound,
        Inbound::Request(Request {
            id: RequestId::Str("agent-9".into()),
            method: "fs/read_text_file".into(),
            params: Some(json!({ "path": "/a" })),
        })
    );
}

/// A response whose id happens to have a method field is still a response.
#[test]
fn result_takes_precedence_over_method() {
    let inbound = decode_inbound(br#"{"id":1,"method":"odd","result":null}"#).expect("decode");
    assert!(matches!(inbound, Inbound::Response(_)));
}

/// Payloads matching no envelope shape are decode errors.
#[test]
fn unclassifiable_payloads_fail() {
    for raw in [
        &br#"{"jsonrpc":"2.0"}"#[..],
        br#"{"jsonrpc":"2.0","id":1}"#,
        br#"[1,2,3]"#,
        br#""text""#,
        br#"{"id":1,"result":{},"error":{"code":1,"message":"both"}}"#,
        br#"{"method":42}"#,
        br#"{"id":{"nested":true},"result":{}}"#,
        b"not json",
    ] {
        let err = decode_inbound(raw).expect_err("must not classify");
        assert!(
            matches!(err, AppError::Decode(_)),
            "{}: {err:?}",
            String::from_utf8_lossy(raw)
        );
    }
}

/// Encoding then decoding an agent request preserves it.
#[test]
fn request_survives_the_wire() {
    let request = Request {
        id: RequestId::Number(12),
        method: "terminal/create".into(),
        params: Some(json!({ "command": "ls", "args": ["-la"] })),
    };
    let line = request.encode_line().expect("encode");
    let decoded = decode_inbound(line.strip_suffix(b"\n").expect("terminator")).expect("decode");
    assert_eq!(decoded, Inbound::Request(request));
}

// ── Method detection ─────────────────────────────────────────────────────────

/// Method names are detected on requests and notifications only.
#[test]
fn method_detection() {
    assert_eq!(
        detect_method(br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).as_deref(),
        Some("initialize")
    );
    assert_eq!(detect_method(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#), None);
    assert_eq!(detect_method(b"garbage"), None);
}
