//! Session operation tests: load fallbacks, resume-or-create against the
//! `SQLite` store, config options, and prompt cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use agent_conduit::acp::client::{ResumedSession, SessionStore};
use agent_conduit::acp::schema::{ContentBlock, SessionId, StopReason};
use agent_conduit::persistence::db;
use agent_conduit::persistence::session_store::SqliteSessionStore;
use agent_conduit::AppError;

use super::test_helpers::{client_for, temp_dir, write_agent, READ_LOOP};

/// Agent answering each method with a canned result or error body.
///
/// `arms` are `(method, body)` pairs where `body` is the JSON text following
/// `"id":<id>,`, for example `"result":{}`.
fn scripted_agent(dir: &Path, arms: &[(&str, &str)]) -> std::path::PathBuf {
    let mut script = String::from(READ_LOOP);
    script.push_str("  case \"$line\" in\n");
    for (method, body) in arms {
        script.push_str(&format!(
            "    *'\"method\":\"{method}\"'*) printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,{body}}}\\n' \"$id\" ;;\n"
        ));
    }
    script.push_str("    *) [ -n \"$id\" ] && printf '{\"jsonrpc\":\"2.0\",\"id\":%s,\"result\":{}}\\n' \"$id\" ;;\n");
    script.push_str("  esac\ndone");
    write_agent(dir, &script)
}

async fn launched(dir: &Path, arms: &[(&str, &str)]) -> agent_conduit::acp::client::AcpClient {
    let agent = scripted_agent(dir, arms);
    let (client, _) = client_for(&agent, dir);
    client.launch().await.expect("launch");
    client
}

async fn memory_store() -> SqliteSessionStore {
    SqliteSessionStore::new(Arc::new(db::connect_memory().await.expect("memory db")))
}

// ── session/new ──────────────────────────────────────────────────────────────

/// `session/new` yields the agent's id and optional mode state.
#[tokio::test]
async fn new_session_decodes_modes() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[(
            "session/new",
            r#""result":{"sessionId":"s-1","modes":{"currentModeId":"code","availableModes":[{"id":"code","name":"Code"}]}}"#,
        )],
    )
    .await;

    let response = client
        .new_session(dir.path(), Vec::new())
        .await
        .expect("new session");
    assert_eq!(response.session_id.as_str(), "s-1");
    let modes = response.modes.expect("modes present");
    assert_eq!(modes.current_mode_id, "code");
    assert_eq!(modes.available_modes.len(), 1);

    client.terminate().await;
}

/// A `session/new` result without a session id is a decode error.
#[tokio::test]
async fn new_session_without_id_is_decode_error() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[("session/new", r#""result":{}"#)]).await;

    let err = client
        .new_session(dir.path(), Vec::new())
        .await
        .expect_err("missing id");
    assert!(matches!(err, AppError::Decode(_)), "got {err:?}");
    client.terminate().await;
}

// ── session/load ─────────────────────────────────────────────────────────────

/// A null load result resolves to the requested id.
#[tokio::test]
async fn load_with_null_result_uses_requested_id() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[("session/load", r#""result":null"#)]).await;

    let outcome = client
        .load_session(&SessionId::from("wanted"), dir.path(), Vec::new())
        .await
        .expect("load");
    assert_eq!(outcome.session_id.as_str(), "wanted");
    assert!(outcome.response.is_none());
    client.terminate().await;
}

/// An empty object load result carries no structured payload either.
#[tokio::test]
async fn load_with_empty_object_result_uses_requested_id() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[("session/load", r#""result":{}"#)]).await;

    let outcome = client
        .load_session(&SessionId::from("wanted"), dir.path(), Vec::new())
        .await
        .expect("load");
    assert_eq!(outcome.session_id.as_str(), "wanted");
    assert!(outcome.response.is_none());
    client.terminate().await;
}

/// A structured load result's id wins over the requested one.
#[tokio::test]
async fn load_with_structured_result_uses_agent_id() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[("session/load", r#""result":{"sessionId":"renamed"}"#)],
    )
    .await;

    let outcome = client
        .load_session(&SessionId::from("wanted"), dir.path(), Vec::new())
        .await
        .expect("load");
    assert_eq!(outcome.session_id.as_str(), "renamed");
    assert!(outcome.response.is_some());
    client.terminate().await;
}

/// A snake_case `session_id` is still picked up.
#[tokio::test]
async fn load_with_loose_snake_case_id() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[("session/load", r#""result":{"session_id":"loose"}"#)],
    )
    .await;

    let outcome = client
        .load_session(&SessionId::from("wanted"), dir.path(), Vec::new())
        .await
        .expect("load");
    assert_eq!(outcome.session_id.as_str(), "loose");
    client.terminate().await;
}

/// "Already active" errors count as a successful load.
#[tokio::test]
async fn load_of_active_session_succeeds() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[(
            "session/load",
            r#""error":{"code":-32000,"message":"Session Already Active"}"#,
        )],
    )
    .await;

    let outcome = client
        .load_session(&SessionId::from("live"), dir.path(), Vec::new())
        .await
        .expect("already active is success");
    assert_eq!(outcome.session_id.as_str(), "live");
    assert!(outcome.response.is_none());
    client.terminate().await;
}

/// Other load errors propagate.
#[tokio::test]
async fn load_of_unknown_session_fails() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[(
            "session/load",
            r#""error":{"code":-32002,"message":"session not found"}"#,
        )],
    )
    .await;

    let err = client
        .load_session(&SessionId::from("gone"), dir.path(), Vec::new())
        .await
        .expect_err("not found");
    assert!(matches!(err, AppError::Agent(ref rpc) if rpc.code == -32002), "got {err:?}");
    client.terminate().await;
}

// ── resume_or_create ─────────────────────────────────────────────────────────

/// Without a stored id a new session is created and remembered.
#[tokio::test]
async fn resume_creates_and_stores_session() {
    let dir = temp_dir();
    let store = memory_store().await;
    let client = launched(
        dir.path(),
        &[("session/new", r#""result":{"sessionId":"fresh"}"#)],
    )
    .await;

    let session = client
        .resume_or_create(&store, "worktree-a", dir.path(), Vec::new())
        .await
        .expect("resume or create");
    assert!(matches!(session, ResumedSession::Created(_)));
    assert_eq!(session.session_id().as_str(), "fresh");
    assert_eq!(
        store.get("worktree-a").await.expect("get"),
        Some(SessionId::from("fresh"))
    );
    client.terminate().await;
}

/// A stored id is loaded rather than replaced.
#[tokio::test]
async fn resume_loads_stored_session() {
    let dir = temp_dir();
    let store = memory_store().await;
    store
        .save("worktree-a", &SessionId::from("stored"))
        .await
        .expect("seed");
    let client = launched(
        dir.path(),
        &[
            ("session/load", r#""result":null"#),
            ("session/new", r#""error":{"code":-32000,"message":"unexpected"}"#),
        ],
    )
    .await;

    let session = client
        .resume_or_create(&store, "worktree-a", dir.path(), Vec::new())
        .await
        .expect("resume");
    assert!(matches!(session, ResumedSession::Loaded(_)));
    assert_eq!(session.session_id().as_str(), "stored");
    client.terminate().await;
}

/// A stored id the agent rejects is replaced by a new session.
#[tokio::test]
async fn resume_replaces_rejected_session() {
    let dir = temp_dir();
    let store = memory_store().await;
    store
        .save("worktree-a", &SessionId::from("stale"))
        .await
        .expect("seed");
    let client = launched(
        dir.path(),
        &[
            (
                "session/load",
                r#""error":{"code":-32002,"message":"session not found"}"#,
            ),
            ("session/new", r#""result":{"sessionId":"replacement"}"#),
        ],
    )
    .await;

    let session = client
        .resume_or_create(&store, "worktree-a", dir.path(), Vec::new())
        .await
        .expect("resume");
    assert!(matches!(session, ResumedSession::Created(_)));
    assert_eq!(
        store.get("worktree-a").await.expect("get"),
        Some(SessionId::from("replacement"))
    );
    client.terminate().await;
}

// ── Session controls ─────────────────────────────────────────────────────────

/// Config option updates return the new option list, or `None` when empty.
#[tokio::test]
async fn set_config_option_returns_options() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[(
            "session/set_config_option",
            r#""result":{"configOptions":[{"id":"effort","name":"Effort","currentValue":"high","options":[]}]}"#,
        )],
    )
    .await;
    let session = SessionId::from("s");

    let options = client
        .set_config_option(&session, "effort", json!("high"))
        .await
        .expect("set option")
        .expect("options returned");
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].id, "effort");
    assert_eq!(options[0].current_value, json!("high"));

    client.set_mode(&session, "code").await.expect("set mode");
    client.set_model(&session, "fast").await.expect("set model");
    client.authenticate("token").await.expect("authenticate");
    client.terminate().await;
}

/// Mode and model switches accept an agent that answers with no body.
#[tokio::test]
async fn session_controls_accept_null_results() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[
            ("session/set_mode", r#""result":null"#),
            ("session/set_model", r#""result":null"#),
        ],
    )
    .await;
    let session = SessionId::from("s");

    client.set_mode(&session, "plan").await.expect("null set_mode result");
    client.set_model(&session, "slow").await.expect("null set_model result");
    client.terminate().await;
}

/// `authenticate` succeeds on a null result.
#[tokio::test]
async fn authenticate_accepts_null_result() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[("authenticate", r#""result":null"#)]).await;

    client.authenticate("token").await.expect("null result");
    client.terminate().await;
}

/// `authenticate` succeeds on a result it cannot interpret.
#[tokio::test]
async fn authenticate_accepts_unrecognised_result() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[("authenticate", r#""result":{"weird":[1]}"#)]).await;

    client.authenticate("token").await.expect("undecodable result");
    client.terminate().await;
}

/// Empty config option results map to `None`.
#[tokio::test]
async fn set_config_option_without_options() {
    let dir = temp_dir();
    let client = launched(dir.path(), &[]).await;

    let options = client
        .set_config_option(&SessionId::from("s"), "effort", json!("low"))
        .await
        .expect("set option");
    assert!(options.is_none());
    client.terminate().await;
}

// ── Prompt turns ─────────────────────────────────────────────────────────────

/// A prompt turn returns the agent's stop reason.
#[tokio::test]
async fn prompt_returns_stop_reason() {
    let dir = temp_dir();
    let client = launched(
        dir.path(),
        &[("session/prompt", r#""result":{"stopReason":"end_turn"}"#)],
    )
    .await;

    let response = client
        .prompt(&SessionId::from("s"), vec![ContentBlock::text("hello")])
        .await
        .expect("prompt");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    client.terminate().await;
}

/// A timed-out prompt request is cancelled on the agent side.
#[tokio::test]
async fn prompt_timeout_sends_cancel() {
    let dir = temp_dir();
    let log = dir.path().join("seen.log");
    let agent = write_agent(
        dir.path(),
        &format!(
            "while IFS= read -r line; do printf '%s\\n' \"$line\" >> '{}'; done",
            log.display()
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let err = client
        .send_request(
            "session/prompt",
            Some(json!({ "sessionId": "s-9", "prompt": [] })),
            Some(Duration::from_millis(50)),
        )
        .await
        .expect_err("timeout");
    assert!(matches!(err, AppError::Timeout { .. }), "got {err:?}");

    let log = log.as_path();
    let saw_cancel = super::test_helpers::eventually(Duration::from_secs(5), || async move {
        std::fs::read_to_string(log)
            .is_ok_and(|seen| seen.contains(r#""method":"session/cancel""#) && seen.contains("s-9"))
    })
    .await;
    assert!(saw_cancel, "cancel notification not written");
    client.terminate().await;
}
