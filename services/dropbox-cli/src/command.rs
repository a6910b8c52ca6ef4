//! Command-line options
//!
//! `dropbox-cli [--config <path>] [--metrics] <command> [args]`. The global
//! flags may appear before or after the command.

use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone, PartialEq, Eq)]
#[structopt(name = "dropbox-cli", about = "Link Dropbox accounts and query them")]
pub struct Opt {
    /// Config file; falls back to DROPBOX_CONFIG, then ./dropbox.toml
    #[structopt(long, global = true)]
    pub config: Option<String>,
    /// Print the Prometheus metrics snapshot after the command
    #[structopt(long, global = true)]
    pub metrics: bool,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(StructOpt, Debug, Clone, PartialEq, Eq)]
#[structopt(rename_all = "kebab")]
pub enum Command {
    /// Starts linking an account
    Authorize,
    /// Finishes linking from a db-<app_key>:// redirect
    HandleRedirect { url: String },
    /// Lists linked user ids
    Tokens,
    /// Forgets all stored tokens
    Unlink,
    /// Shows the current account, or another account by id
    Account { account_id: Option<String> },
    /// Shows several accounts
    Accounts {
        #[structopt(required = true)]
        account_ids: Vec<String>,
    },
    /// Shows the current account's space usage
    SpaceUsage,
}

impl Command {
    /// Whether the command needs a linked account.
    pub fn needs_client(&self) -> bool {
        matches!(
            self,
            Command::Account { .. } | Command::Accounts { .. } | Command::SpaceUsage
        )
    }
}
