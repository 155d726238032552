//! Command-line host for the GitHub access layer.
//!
//! A stand-in for the desktop UI shell: it drives the same message
//! interface (sign-in, callback completion, logout, clone) that a UI
//! would. The `callback` step accepts the custom-scheme redirect URL the
//! OS hands back, either as an argument or pasted interactively after
//! `login`.

use clap::{Parser, Subcommand};
use octoclone::gitops::is_directory_empty;
use octoclone::{AuthConfig, CloneProgress, Error, Result, Session};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "octoclone", version, about = "GitHub sign-in and repository cloning")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in to GitHub through the browser
    Login,
    /// Complete a sign-in with the redirect URL the OS handed back
    Callback {
        /// Full redirect URL, e.g. `octoclone://oauth/callback?code=...&state=...`
        uri: String,
    },
    /// Show the current sign-in state
    Status,
    /// Remove the stored credential
    Logout,
    /// Shallow-clone a repository
    Clone {
        /// Repository URL (`https://github.com/{owner}/{repo}`)
        url: String,
        /// Target directory, created if missing
        dir: PathBuf,
    },
}

/// Query parameters carried by the OAuth redirect.
#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "octoclone=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let session = Session::new(AuthConfig::from_env()?)?;

    match cli.command {
        Command::Login => login(&session).await,
        Command::Callback { uri } => complete_callback(&session, &uri).await,
        Command::Status => status(&session).await,
        Command::Logout => session.logout(),
        Command::Clone { url, dir } => clone(&session, &url, &dir).await,
    }
}

async fn login(session: &Session) -> Result<()> {
    session.startup().await?;

    let url = session.oauth().initiate_oauth()?;
    println!("Complete the sign-in in your browser:");
    println!("  {}", url);
    println!();
    print!("Paste the redirect URL here: ");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| Error::Configuration(format!("Failed to read redirect URL: {}", e)))?;

    complete_callback(session, line.trim()).await
}

async fn complete_callback(session: &Session, uri: &str) -> Result<()> {
    let (code, state) = parse_callback_uri(uri)?;
    session.oauth().handle_callback(&code, &state).await?;

    let user = session.github().get_current_user().await?;
    println!("Signed in as {}", user.login);
    Ok(())
}

/// Extract `code` and `state` from the custom-scheme redirect, e.g.
/// `octoclone://oauth/callback?code=abc&state=def`.
fn parse_callback_uri(uri: &str) -> Result<(String, String)> {
    let query = uri
        .split_once('?')
        .map(|(_, query)| query)
        .ok_or_else(|| Error::Configuration(format!("Redirect URL has no query: {}", uri)))?;

    let params: CallbackParams = serde_urlencoded::from_str(query)
        .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?;

    match (params.code, params.state) {
        (Some(code), Some(state)) => Ok((code, state)),
        _ => Err(Error::Configuration(
            "Redirect URL is missing code or state".to_string(),
        )),
    }
}

async fn status(session: &Session) -> Result<()> {
    if session.startup().await? {
        let user = session.github().get_current_user().await?;
        println!("Signed in as {}", user.login);
    } else {
        println!("Signed out");
    }
    Ok(())
}

async fn clone(session: &Session, url: &str, dir: &Path) -> Result<()> {
    session.startup().await?;

    if !session.github().validate_repository_url(url).await {
        return Err(Error::Clone(format!(
            "{} is not an accessible GitHub repository",
            url
        )));
    }

    match is_directory_empty(dir) {
        Ok(true) => {}
        Ok(false) => eprintln!("Warning: {} is not empty", dir.display()),
        Err(e) => return Err(Error::Clone(format!("Cannot inspect {}: {}", dir.display(), e))),
    }

    let workdir = session
        .cloner()
        .clone_repository(
            url,
            dir,
            Some(Box::new(|tick: CloneProgress| {
                eprint!("\r{}: {}/{}      ", tick.phase, tick.loaded, tick.total);
            })),
        )
        .await?;
    eprintln!();

    info!(path = %workdir.display(), "Clone complete");
    println!("Cloned into {}", workdir.display());
    Ok(())
}
