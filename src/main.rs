#![forbid(unsafe_code)]

//! `agent-conduit`: run one ACP agent turn from a terminal.
//!
//! Launches the configured agent, initializes it, resumes the session stored
//! for this workspace (or creates one), sends the prompt and prints every
//! agent notification to stdout as one JSON line. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::acp::client::AcpClient;
use agent_conduit::acp::router::RequestRouter;
use agent_conduit::acp::schema::ContentBlock;
use agent_conduit::host::{LocalDelegate, LocalTerminals};
use agent_conduit::persistence::db;
use agent_conduit::persistence::session_store::SqliteSessionStore;
use agent_conduit::{AppError, ClientConfig, Result};

/// How long a cancelled turn may take to wind down.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Drive an ACP agent from the terminal", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Key the session id is stored under; defaults to the working directory.
    #[arg(long)]
    session_key: Option<String>,

    /// Authenticate with this method id after initializing.
    #[arg(long)]
    auth_method: Option<String>,

    /// Prompt text sent to the agent.
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = ClientConfig::load_from_path(&args.config)?;
    let cwd = match &config.working_directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    info!(agent = %config.agent_path.display(), cwd = %cwd.display(), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let store = SqliteSessionStore::new(Arc::new(db::connect(&config.db_path()).await?));

    // ── Launch agent ────────────────────────────────────
    let router = RequestRouter::new(Arc::new(LocalDelegate::new(
        cwd.clone(),
        config.permissions.policy,
    )))
    .with_terminal(Arc::new(LocalTerminals::new(Some(cwd.clone()))));
    let client = AcpClient::new(config, router);
    client.launch().await?;

    if let Some(mut notifications) = client.take_notifications().await {
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                println!(
                    "{}",
                    json!({ "method": notification.method, "params": notification.params })
                );
            }
        });
    }

    let outcome = drive(&client, &store, &args, &cwd).await;
    client.terminate().await;
    outcome
}

async fn drive(
    client: &AcpClient,
    store: &SqliteSessionStore,
    args: &Cli,
    cwd: &std::path::Path,
) -> Result<()> {
    let init = client.initialize(None).await?;
    if let Some(method_id) = &args.auth_method {
        client.authenticate(method_id).await?;
        info!(method_id = %method_id, "authenticated");
    } else if !init.auth_methods.is_empty() {
        info!(
            methods = ?init.auth_methods.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "agent offers authentication; pass --auth-method if the prompt is rejected"
        );
    }

    let key = args
        .session_key
        .clone()
        .unwrap_or_else(|| cwd.display().to_string());
    let session = client.resume_or_create(store, &key, cwd, Vec::new()).await?;
    let session_id = session.session_id().clone();
    info!(%session_id, key = %key, "session ready");

    let prompt = client.prompt(&session_id, vec![ContentBlock::text(args.prompt.join(" "))]);
    tokio::pin!(prompt);

    let finished = tokio::select! {
        response = &mut prompt => Some(response),
        () = shutdown_signal() => None,
    };
    let response = match finished {
        Some(response) => response?,
        None => {
            warn!(%session_id, "interrupt received, cancelling turn");
            client.cancel_session(&session_id).await?;
            tokio::time::timeout(CANCEL_GRACE, &mut prompt)
                .await
                .map_err(|_| AppError::Timeout {
                    method: "session/prompt".into(),
                    after: CANCEL_GRACE,
                })??
        }
    };

    info!(%session_id, stop_reason = ?response.stop_reason, "turn finished");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
