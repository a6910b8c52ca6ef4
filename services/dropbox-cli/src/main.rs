//! Dropbox CLI
//!
//! Single-binary front end for the SDK:
//! 1. Loads `SdkConfig` and opens the file-backed token store
//! 2. Restores the linked account, if any
//! 3. Links, unlinks, or calls `users` routes for the linked account

mod command;
mod host;
mod metrics;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use common::SdkConfig;
use dropbox_auth::{FileStorage, LinkResult, LinkStart, Url};
use dropbox_client::DropboxSession;
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Command, Opt};
use crate::host::CliHost;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr, LOG_LEVEL / RUST_LOG filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let opt = Opt::from_args();

    let prometheus_handle = metrics::install_recorder()?;

    let config_path = SdkConfig::resolve_path(opt.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = SdkConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        auth_host = %config.app.auth_host,
        meta = %config.hosts.meta,
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let storage = FileStorage::load(config.storage.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open token store {}",
                config.storage.path.display()
            )
        })?;
    let host = Arc::new(CliHost::from_config(&config.app));
    let mut session = DropboxSession::setup(config, Arc::new(storage), host)
        .await
        .context("failed to set up session")?;

    let mut stdout = std::io::stdout();
    let outcome = run(opt.command, &mut session, &mut stdout).await;

    if opt.metrics {
        print!("{}", prometheus_handle.render());
    }

    if let Err(e) = &outcome {
        error!(error = %e, "command failed");
    }
    outcome
}

/// Execute one command against the session, writing results to `out`.
async fn run(command: Command, session: &mut DropboxSession, out: &mut impl Write) -> Result<()> {
    if command.needs_client() && !session.is_linked() {
        bail!("no linked account; run `dropbox-cli authorize` first");
    }

    match command {
        Command::Authorize => match session.authorize().await? {
            LinkStart::Handoff(_) => writeln!(out, "Continue in the Dropbox app.")?,
            LinkStart::ConsentPage(url) => {
                info!("consent page presented");
                writeln!(out, "Open this URL in a browser and approve access:\n  {url}")?;
                writeln!(
                    out,
                    "Then run: dropbox-cli handle-redirect '<the db-... URL you were sent to>'"
                )?;
            }
        },
        Command::HandleRedirect { url: raw } => {
            let url = Url::parse(&raw).with_context(|| format!("invalid URL: {raw}"))?;
            match session.handle_redirect_url(&url).await? {
                Some(LinkResult::Success(token)) => {
                    writeln!(out, "Linked account {}", token.user_id())?;
                }
                Some(LinkResult::Error(kind, message)) => {
                    bail!("link failed ({kind:?}): {message}");
                }
                None => bail!("not a link redirect for this app: {raw}"),
            }
        }
        Command::Tokens => {
            let tokens = session.auth().get_all_access_tokens().await?;
            if tokens.is_empty() {
                writeln!(out, "No linked accounts.")?;
            }
            for user_id in tokens.keys() {
                writeln!(out, "{user_id}")?;
            }
        }
        Command::Unlink => {
            if session.is_linked() {
                session.unlink().await?;
                writeln!(out, "Unlinked.")?;
            } else {
                writeln!(out, "No linked account.")?;
            }
        }
        Command::Account { account_id } => {
            let client = linked(session)?;
            let json = match account_id {
                Some(id) => {
                    serde_json::to_string_pretty(&client.users().get_account(&id).response().await?)?
                }
                None => serde_json::to_string_pretty(
                    &client.users().get_current_account().response().await?,
                )?,
            };
            writeln!(out, "{json}")?;
        }
        Command::Accounts { account_ids: ids } => {
            let accounts = linked(session)?
                .users()
                .get_account_batch(&ids)
                .response()
                .await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&accounts)?)?;
        }
        Command::SpaceUsage => {
            let usage = linked(session)?.users().get_space_usage().response().await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&usage)?)?;
        }
    }
    Ok(())
}

fn linked(session: &DropboxSession) -> Result<&dropbox_client::DropboxClient> {
    session
        .client()
        .context("no linked account; run `dropbox-cli authorize` first")
}
