//! Lifecycle tests for `AcpClient` against stub `/bin/sh` agents.
//!
//! Covers launch and terminate transitions, request/response correlation,
//! deadlines, process exit, and write failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use agent_conduit::acp::client::Direction;
use agent_conduit::acp::schema::methods;
use agent_conduit::AppError;

use super::test_helpers::{
    client_for, client_with_config, config_for, echo_agent, eventually, id_echo_agent, silent_agent,
    temp_dir, write_agent, READ_LOOP,
};

// ── Launch state machine ─────────────────────────────────────────────────────

/// A request before `launch` fails without touching the pending table.
#[tokio::test]
async fn request_before_launch_is_rejected() {
    let dir = temp_dir();
    let agent = silent_agent(dir.path());
    let (client, _) = client_for(&agent, dir.path());

    let err = client
        .send_request("ping", None, None)
        .await
        .expect_err("not launched");
    assert!(matches!(err, AppError::ProcessNotRunning), "got {err:?}");
    assert_eq!(client.pending_count().await, 0);
    assert!(!client.is_running().await);
}

/// Launching twice without terminating is refused.
#[tokio::test]
async fn second_launch_is_already_running() {
    let dir = temp_dir();
    let agent = silent_agent(dir.path());
    let (client, _) = client_for(&agent, dir.path());

    client.launch().await.expect("first launch");
    let err = client.launch().await.expect_err("second launch");
    assert!(matches!(err, AppError::AlreadyRunning), "got {err:?}");
    assert!(client.is_running().await);

    client.terminate().await;
}

/// Terminating repeatedly, and before any launch, is harmless.
#[tokio::test]
async fn terminate_is_idempotent() {
    let dir = temp_dir();
    let agent = silent_agent(dir.path());
    let (client, _) = client_for(&agent, dir.path());

    client.terminate().await;
    assert!(!client.is_running().await);

    client.launch().await.expect("launch");
    client.terminate().await;
    client.terminate().await;
    assert!(!client.is_running().await);
    assert_eq!(client.pending_count().await, 0);
}

/// A terminated client can be launched again and serves requests.
#[tokio::test]
async fn relaunch_after_terminate() {
    let dir = temp_dir();
    let agent = echo_agent(dir.path(), "{}");
    let (client, _) = client_for(&agent, dir.path());

    client.launch().await.expect("launch");
    client.terminate().await;

    client.launch().await.expect("relaunch");
    let result = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect("response after relaunch");
    assert_eq!(result, json!({}));
    client.terminate().await;
}

/// A missing agent binary surfaces as an I/O error and leaves the client idle.
#[tokio::test]
async fn launch_of_missing_agent_fails() {
    let dir = temp_dir();
    let (client, _) = client_for(&dir.path().join("no-such-agent"), dir.path());

    let err = client.launch().await.expect_err("missing binary");
    assert!(matches!(err, AppError::Io(_)), "got {err:?}");
    assert!(!client.is_running().await);
}

// ── Request / response ───────────────────────────────────────────────────────

/// Agent answering `{}` to request 1: initialize succeeds with defaults.
#[tokio::test]
async fn initialize_against_echo_agent() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        "while IFS= read -r line; do printf '%s\\n' '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'; done",
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let response = client.initialize(None).await.expect("initialize");
    assert_eq!(response.protocol_version, 1);
    assert!(!response.agent_capabilities.load_session);
    assert!(response.auth_methods.is_empty());
    assert_eq!(client.pending_count().await, 0);

    client.terminate().await;
}

/// Outgoing ids start at 1 and strictly increase, including under concurrency.
#[tokio::test]
async fn request_ids_strictly_increase() {
    let dir = temp_dir();
    let agent = id_echo_agent(dir.path());
    let mut config = config_for(&agent, dir.path());
    config.debug_stream = true;
    let (client, _) = client_with_config(config);
    client.launch().await.expect("launch");
    let mut debug = client.take_debug_messages().await.expect("debug stream");

    for n in 1..=5_i64 {
        let result = client
            .send_request("ping", None, Some(Duration::from_secs(5)))
            .await
            .expect("sequential response");
        assert_eq!(result, json!({ "echo": n }));
    }

    let client = Arc::new(client);
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .send_request("ping", None, Some(Duration::from_secs(5)))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("concurrent response");
    }

    let mut outgoing = Vec::new();
    while let Ok(message) = debug.try_recv() {
        if message.direction == Direction::Outgoing {
            let value: serde_json::Value =
                serde_json::from_slice(&message.raw).expect("mirrored json");
            outgoing.push(value["id"].as_i64().expect("numeric id"));
        }
    }
    assert_eq!(outgoing.len(), 15);
    assert!(outgoing.windows(2).all(|pair| pair[0] < pair[1]), "{outgoing:?}");
    assert_eq!(outgoing.first(), Some(&1));

    client.terminate().await;
}

/// A JSON-RPC error answer is surfaced as `AppError::Agent`.
#[tokio::test]
async fn agent_error_is_surfaced() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        &format!(
            "{READ_LOOP}  printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,\"error\":{{\"code\":-32000,\"message\":\"nope\"}}}}\\n' \"$id\"\ndone"
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let err = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect_err("error answer");
    match err {
        AppError::Agent(rpc) => {
            assert_eq!(rpc.code, -32000);
            assert_eq!(rpc.message, "nope");
        }
        other => panic!("expected agent error, got {other:?}"),
    }
    assert_eq!(client.pending_count().await, 0);
    client.terminate().await;
}

/// An error sent alongside `"result":null` still fails the request at once.
#[tokio::test]
async fn error_with_null_result_is_surfaced() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        &format!(
            "{READ_LOOP}  printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,\"result\":null,\"error\":{{\"code\":-32001,\"message\":\"busy\"}}}}\\n' \"$id\"\ndone"
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let err = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect_err("error answer");
    match err {
        AppError::Agent(rpc) => assert_eq!(rpc.code, -32001),
        other => panic!("expected agent error, got {other:?}"),
    }
    client.terminate().await;
}

// ── Deadlines ────────────────────────────────────────────────────────────────

/// A silent agent times a 50ms request out promptly and leaves nothing pending.
#[tokio::test]
async fn request_times_out() {
    let dir = temp_dir();
    let agent = silent_agent(dir.path());
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let started = Instant::now();
    let err = client
        .send_request("ping", None, Some(Duration::from_millis(50)))
        .await
        .expect_err("timeout");
    let elapsed = started.elapsed();

    match err {
        AppError::Timeout { method, after } => {
            assert_eq!(method, "ping");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert_eq!(client.pending_count().await, 0);
    assert!(client.is_running().await);

    client.terminate().await;
}

/// A response arriving after the deadline is dropped without side effects.
#[tokio::test]
async fn late_response_is_ignored() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        &format!(
            "{READ_LOOP}  if [ \"$id\" = 1 ]; then sleep 0.3; fi\n  printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,\"result\":{{\"id\":%s}}}}\\n' \"$id\" \"$id\"\ndone"
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let err = client
        .send_request("slow", None, Some(Duration::from_millis(50)))
        .await
        .expect_err("timeout");
    assert!(matches!(err, AppError::Timeout { .. }), "got {err:?}");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.pending_count().await, 0);

    let result = client
        .send_request("fast", None, Some(Duration::from_secs(5)))
        .await
        .expect("second request resolves with its own answer");
    assert_eq!(result, json!({ "id": 2 }));

    client.terminate().await;
}

// ── Termination and exit ─────────────────────────────────────────────────────

/// Terminate fails every in-flight request with `ProcessNotRunning`.
#[tokio::test]
async fn terminate_fails_all_pending() {
    let dir = temp_dir();
    let agent = silent_agent(dir.path());
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");
    let client = Arc::new(client);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.send_request("ping", None, None).await })
        })
        .collect();

    let all_pending = eventually(Duration::from_secs(5), || {
        let client = Arc::clone(&client);
        async move { client.pending_count().await == 5 }
    })
    .await;
    assert!(all_pending, "requests never became pending");

    client.terminate().await;
    for handle in handles {
        let err = handle.await.expect("join").expect_err("failed by terminate");
        assert!(matches!(err, AppError::ProcessNotRunning), "got {err:?}");
    }
    assert_eq!(client.pending_count().await, 0);

    let err = client
        .send_request("ping", None, None)
        .await
        .expect_err("after terminate");
    assert!(matches!(err, AppError::ProcessNotRunning), "got {err:?}");
}

/// An agent exiting mid-request fails it with the exit code.
#[tokio::test]
async fn agent_exit_fails_pending_with_exit_code() {
    let dir = temp_dir();
    let agent = write_agent(dir.path(), "IFS= read -r line\nexit 3");
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let err = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect_err("agent exits");
    assert!(matches!(err, AppError::ProcessExited(Some(3))), "got {err:?}");
    assert!(!client.is_running().await);
    assert_eq!(client.pending_count().await, 0);
}

/// An exit is reported even while a background child keeps stdout open.
#[tokio::test]
async fn agent_exit_is_reported_while_grandchild_holds_stdout() {
    let dir = temp_dir();
    let agent = write_agent(dir.path(), "IFS= read -r line\nsleep 10 &\nexit 3");
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        client.send_request("ping", None, None),
    )
    .await
    .expect("exit must resolve the pending request");
    let err = outcome.expect_err("agent exits");

    assert!(matches!(err, AppError::ProcessExited(Some(3))), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!client.is_running().await);
    assert_eq!(client.pending_count().await, 0);
}

/// Lines written before exit are still dispatched ahead of the exit.
#[tokio::test]
async fn output_before_exit_is_delivered() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        "IFS= read -r line\nprintf '%s\\n' '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"last\":true}}'\nexit 0",
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let result = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect("answer written before exit");
    assert_eq!(result, json!({ "last": true }));

    let client = &client;
    let exited = eventually(Duration::from_secs(5), || async move { !client.is_running().await }).await;
    assert!(exited, "client never observed the exit");
}

/// An agent that closed its stdin makes writes fail with `AppError::Write`.
#[tokio::test]
async fn closed_stdin_is_a_write_failure() {
    let dir = temp_dir();
    let agent = write_agent(dir.path(), "exec 0<&-\nexec sleep 5");
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect_err("write fails");
    assert!(matches!(err, AppError::Write(_)), "got {err:?}");
    assert_eq!(client.pending_count().await, 0);

    client.terminate().await;
}

// ── Notifications and agent requests ────────────────────────────────────────

/// Notifications are delivered in wire order, independent of pending state.
#[tokio::test]
async fn notifications_arrive_in_order() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        &format!(
            "{READ_LOOP}  for n in 1 2 3; do printf '{{\"jsonrpc\":\"2.0\",\"method\":\"session/update\",\"params\":{{\"n\":%s}}}}\\n' \"$n\"; done\n  printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,\"result\":{{}}}}\\n' \"$id\"\ndone"
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");
    let mut notifications = client.take_notifications().await.expect("stream");
    assert!(client.take_notifications().await.is_none(), "taken once");

    client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect("response");

    for n in 1..=3 {
        let notification = notifications.try_recv().expect("queued before response");
        assert_eq!(notification.method, methods::SESSION_UPDATE);
        assert_eq!(notification.params, Some(json!({ "n": n })));
    }

    client.terminate().await;
    assert!(notifications.recv().await.is_none(), "closed by terminate");
}

/// Agent-initiated requests are routed and answered with the agent's id.
#[tokio::test]
async fn agent_request_is_answered() {
    let dir = temp_dir();
    let reply = dir.path().join("reply.json");
    let agent = write_agent(
        dir.path(),
        &format!(
            r#"IFS= read -r line
printf '%s\n' '{{"jsonrpc":"2.0","id":"agent-1","method":"fs/read_text_file","params":{{"sessionId":"s","path":"/w/a.txt"}}}}'
IFS= read -r answer
printf '%s\n' "$answer" > '{reply}'
printf '%s\n' '{{"jsonrpc":"2.0","id":"agent-2","method":"unknown/method"}}'
IFS= read -r answer
printf '%s\n' "$answer" >> '{reply}'
printf '%s\n' '{{"jsonrpc":"2.0","id":1,"result":{{}}}}'
cat > /dev/null"#,
            reply = reply.display()
        ),
    );
    let (client, delegate) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect("final response");

    let written = std::fs::read_to_string(&reply).expect("agent recorded replies");
    let mut lines = written.lines();
    let read: serde_json::Value =
        serde_json::from_str(lines.next().expect("read reply")).expect("json");
    assert_eq!(read["id"], "agent-1");
    assert_eq!(read["result"]["content"], "contents of /w/a.txt");

    let unknown: serde_json::Value =
        serde_json::from_str(lines.next().expect("unknown reply")).expect("json");
    assert_eq!(unknown["id"], "agent-2");
    assert_eq!(unknown["error"]["code"], -32601);

    assert_eq!(delegate.reads.lock().await.len(), 1);
    client.terminate().await;
}

/// Garbage lines on stdout are skipped and do not disturb correlation.
#[tokio::test]
async fn malformed_lines_are_skipped() {
    let dir = temp_dir();
    let agent = write_agent(
        dir.path(),
        &format!(
            "{READ_LOOP}  printf 'not json\\n[1,2]\\n{{\"jsonrpc\":\"2.0\"}}\\n\\n'\n  printf '{{\"jsonrpc\":\"2.0\",\"id\":%s,\"result\":\"ok\"}}\\n' \"$id\"\ndone"
        ),
    );
    let (client, _) = client_for(&agent, dir.path());
    client.launch().await.expect("launch");

    let result = client
        .send_request("ping", None, Some(Duration::from_secs(5)))
        .await
        .expect("response after garbage");
    assert_eq!(result, json!("ok"));
    assert!(client.is_running().await);
    client.terminate().await;
}
