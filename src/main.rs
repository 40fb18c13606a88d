//! CLI entry point for the OSF connection tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use osf_connection::auth::{OAuthConfig, default_token_path};
use osf_connection::{AbortHandle, ClientConfig, ConnectionManager, Reply, RequestOptions};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod login_prompt;
mod progress;

use app_config::FileConfig;
use cli::{Args, Command};
use login_prompt::PromptLogin;
use progress::BarReporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_file_config(args.config.as_deref())?;
    let config = client_config(&args, file_config)?;
    let manager = ConnectionManager::builder(config)
        .login_provider(Arc::new(PromptLogin))
        .build()
        .context("Failed to set up the OSF connection")?;

    if args.command.requires_login() {
        let user = manager.login().await.context("Login failed")?;
        debug!(user_id = %user.id, "session ready");
    }

    run(&manager, &args).await
}

/// Merges CLI flags over the config file over built-in defaults.
fn client_config(args: &Args, file: FileConfig) -> Result<ClientConfig> {
    let token_path = match args.token_file.clone().or(file.token_file) {
        Some(path) => path,
        None => default_token_path().context("Could not determine where to store the token")?,
    };

    let mut oauth = OAuthConfig::osf(args.client_id.clone().or(file.client_id).unwrap_or_default());
    if let Some(redirect_uri) = file.redirect_uri {
        oauth.redirect_uri = redirect_uri;
    }

    let mut config = ClientConfig::new(token_path).with_oauth(oauth);
    if let Some(url) = args.api_base_url.clone().or(file.api_base_url) {
        config = config.with_api_base_url(url);
    }
    let connect = file
        .connect_timeout_secs
        .unwrap_or(config.connect_timeout_secs);
    let read = file.read_timeout_secs.unwrap_or(config.read_timeout_secs);
    Ok(config.with_timeouts(connect, read))
}

async fn run(manager: &ConnectionManager, args: &Args) -> Result<()> {
    match &args.command {
        Command::Login => {
            let user = manager.login().await.context("Login failed")?;
            println!("Logged in as {} ({})", user.display_name(), user.id);
        }
        Command::Logout => {
            if manager.check_for_stored_token() {
                manager.logout().await;
                println!("Logged out");
            } else {
                info!("No active session");
            }
        }
        Command::Whoami => {
            let user = manager
                .logged_in_user()
                .context("No user is logged in")?;
            print_json(&user.raw)?;
        }
        Command::Projects => {
            let reply = manager.get_user_projects(RequestOptions::new()).await?;
            print_reply(&reply)?;
        }
        Command::Repos { project_id } => {
            let reply = manager
                .get_project_repos(project_id, RequestOptions::new())
                .await?;
            print_reply(&reply)?;
        }
        Command::Files { project_id, repo } => {
            let reply = manager
                .get_repo_files(project_id, repo, RequestOptions::new())
                .await?;
            print_reply(&reply)?;
        }
        Command::Info { file_id } => {
            let reply = manager
                .get_file_info(file_id, RequestOptions::new())
                .await?;
            print_reply(&reply)?;
        }
        Command::Download { url, destination } => {
            let options = transfer_options(args.quiet);
            let path = manager.download_file(url, destination, options).await?;
            println!("Saved {}", path.display());
        }
        Command::Upload { url, source } => {
            let options = transfer_options(args.quiet);
            let reply = manager.upload_path(url, source, options).await?;
            info!(status = reply.status().as_u16(), "upload accepted");
            if !reply.body().is_empty() {
                print_reply(&reply)?;
            }
        }
    }
    Ok(())
}

/// Progress bar unless quiet, and an abort handle wired to Ctrl-C.
fn transfer_options(quiet: bool) -> RequestOptions {
    let abort = AbortHandle::new();
    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling transfer");
            on_interrupt.abort();
        }
    });

    let options = RequestOptions::new().with_abort(abort);
    if quiet {
        options
    } else {
        options.with_progress_reporter(Arc::new(BarReporter::new()))
    }
}

fn print_reply(reply: &Reply) -> Result<()> {
    let document: serde_json::Value = reply.json()?;
    print_json(&document)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
