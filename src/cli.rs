//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Authenticated command-line access to the Open Science Framework API.
///
/// Logs in through the OAuth2 browser flow, keeps the access token between
/// runs and replays requests that failed because the session expired.
#[derive(Parser, Debug)]
#[command(name = "osf-connection")]
#[command(author, version, about)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/osf-connection/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Where the access token is stored
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// OSF API base URL
    #[arg(long, global = true)]
    pub api_base_url: Option<String>,

    /// OAuth2 client id used for interactive login
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Log in, reusing the stored token while it is valid
    Login,
    /// Revoke the token and forget it
    Logout,
    /// Print the logged-in user
    Whoami,
    /// List the projects of the logged-in user
    Projects,
    /// List the storage providers of a project
    Repos {
        /// Project (node) id
        project_id: String,
    },
    /// List the files of a project's storage provider
    Files {
        /// Project (node) id
        project_id: String,
        /// Storage provider name, e.g. osfstorage
        repo: String,
    },
    /// Print the metadata of a file
    Info {
        /// File id
        file_id: String,
    },
    /// Download a file; the destination is replaced only when the download completes
    Download {
        /// Download URL
        url: String,
        /// Destination file path
        destination: PathBuf,
    },
    /// Upload a local file with PUT
    Upload {
        /// Upload URL
        url: String,
        /// Local file to upload
        source: PathBuf,
    },
}

impl Command {
    /// True for commands that need a logged-in session before they run.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        !matches!(self, Self::Login | Self::Logout)
    }
}
