//! Login-shell environment capture for agent processes.
//!
//! Hosts started from a desktop launcher inherit a minimal environment, so
//! agents would not find the tools the user sees in a terminal. The user's
//! interactive login shell is asked once for its environment; the result is
//! cached for the lifetime of the process and merged into every agent's
//! environment.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Deadline for the login shell to print its environment.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

static LOGIN_ENV: OnceCell<HashMap<String, String>> = OnceCell::const_new();

/// The user's interactive login-shell environment.
///
/// Falls back to the current process environment if the shell cannot be
/// run, times out, or prints nothing usable.
pub async fn login_shell_env() -> &'static HashMap<String, String> {
    LOGIN_ENV
        .get_or_init(|| async {
            match capture_login_env().await {
                Some(vars) => vars,
                None => env::vars().collect(),
            }
        })
        .await
}

/// Environment for a child process: `base` plus `PWD` set to
/// `working_dir` and `path_dir` moved to the front of `PATH`.
#[must_use]
pub fn child_env(
    base: &HashMap<String, String>,
    working_dir: &Path,
    path_dir: Option<&Path>,
) -> HashMap<String, String> {
    let mut vars = base.clone();
    vars.insert("PWD".into(), working_dir.to_string_lossy().into_owned());

    if let Some(dir) = path_dir {
        let current = vars.get("PATH").cloned().unwrap_or_default();
        let mut entries: Vec<_> = env::split_paths(&current)
            .filter(|entry| entry.as_path() != dir)
            .collect();
        entries.insert(0, dir.to_path_buf());
        match env::join_paths(entries) {
            Ok(joined) => {
                vars.insert("PATH".into(), joined.to_string_lossy().into_owned());
            }
            Err(err) => warn!(%err, dir = %dir.display(), "shell env: cannot prepend to PATH"),
        }
    }

    vars
}

/// Parse the NUL-separated output of `env -0`.
#[must_use]
pub fn parse_env_output(raw: &[u8]) -> HashMap<String, String> {
    raw.split(|b| *b == 0)
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (key, value) = entry.split_once('=')?;
            // Shell start-up noise can precede the first entry.
            let key = key.rsplit(['\n', '\r']).next().unwrap_or_default();
            (!key.is_empty()).then(|| (key.to_owned(), value.to_owned()))
        })
        .collect()
}

async fn capture_login_env() -> Option<HashMap<String, String>> {
    let shell = env::var("SHELL").unwrap_or_else(|_| default_shell().to_owned());

    let output = Command::new(&shell)
        .args(["-i", "-l", "-c", "env -0"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(CAPTURE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            warn!(shell = %shell, status = %output.status, "shell env: login shell failed, using process env");
            return None;
        }
        Ok(Err(err)) => {
            warn!(shell = %shell, %err, "shell env: cannot run login shell, using process env");
            return None;
        }
        Err(_elapsed) => {
            warn!(shell = %shell, "shell env: login shell timed out, using process env");
            return None;
        }
    };

    let vars = parse_env_output(&output.stdout);
    if vars.contains_key("PATH") {
        debug!(shell = %shell, count = vars.len(), "shell env: captured login environment");
        Some(vars)
    } else {
        warn!(shell = %shell, "shell env: login shell printed no PATH, using process env");
        None
    }
}

fn default_shell() -> &'static str {
    if cfg!(target_os = "macos") {
        "/bin/zsh"
    } else {
        "/bin/sh"
    }
}
