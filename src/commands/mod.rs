//! One handler per CLI subcommand.

mod analyze;
mod cache;
mod channels;
mod sync;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::AppError;
use crate::slack::{with_retry, SlackApi, SlackClient, WorkspaceCache};

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(cli.config.as_deref(), cli.overrides())?;
    tracing::debug!("Export root: {}", config.export_root.display());

    match cli.command {
        Command::Channels(args) => channels::list_channels(&config, args).await,
        Command::Sync(args) => sync::sync_channels(&config, args).await,
        Command::Analyze(args) => analyze::analyze_exports(&config, args).await,
        Command::Cache(command) => cache::run_cache_command(&config, command).await,
    }
}

/// An authenticated Slack connection plus the workspace cache.
struct SlackSession {
    api: Arc<dyn SlackApi>,
    cache: WorkspaceCache,
}

async fn connect(config: &Config) -> Result<SlackSession, AppError> {
    let token = config.require_slack_token()?;
    if token.starts_with("xoxc-") && config.slack_cookie.is_none() {
        tracing::warn!("xoxc- tokens usually need SLACK_DS_COOKIE as well");
    }

    let client = SlackClient::new(token.to_string()).with_session_cookie(config.slack_cookie.clone());
    let auth = with_retry(&config.retry, "auth.test", || client.auth_test()).await?;
    println!("Authenticated as {} on {}", auth.user_name, auth.team_name);

    let client = client.with_team_id(auth.team_id);
    Ok(SlackSession {
        api: Arc::new(client),
        cache: WorkspaceCache::new(&config.export_root).with_ttl(config.cache_ttl),
    })
}

/// Cancel the returned token on Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing the current step");
            trigger.cancel();
        }
    });
    token
}
