//! Vault CLI — command-line front end for the Vault console backend.
//!
//! Signs in, keeps the session in `~/.vault`, and sends API requests through
//! the authenticated client so expired access tokens are refreshed
//! transparently.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use vault_client::{ApiRequest, ClientConfig, LoginRedirect, Method, VaultClient};
use vault_storage::FileBackend;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// Vault — console client for the Vault backend.
#[derive(Parser)]
#[command(
    name = "vault",
    version,
    about = "Vault CLI — sign in to the Vault backend and call its API",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         VAULT_API_URL       Backend base URL (default: http://127.0.0.1:8080/api)\n  \
         VAULT_SESSION_DIR   Where the session is stored (default: ~/.vault)\n  \
         VAULT_PASSWORD      Password for `vault login`\n\n\
         {DIM}Examples:{RESET}\n  \
         vault login --email a@b.com\n  \
         vault whoami\n  \
         vault request GET /documents --query status=pending\n  \
         vault request POST /chat --data '{{\"message\":\"hello\"}}'"
    ),
)]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "VAULT_API_URL")]
    addr: Option<String>,

    /// Directory holding the persisted session.
    #[arg(long, env = "VAULT_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "VAULT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session.
    Login {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "VAULT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and remove the stored session.
    Logout,
    /// Show who the stored session belongs to.
    Whoami,
    /// Send an authenticated request and print the JSON response.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// API path relative to the base URL, e.g. `/documents`.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
    },
}

// ── Output helpers ───────────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

/// Tells the user to sign in again once the session could not be refreshed.
struct CliRedirect;

impl LoginRedirect for CliRedirect {
    fn redirect_to_login(&self, login_path: &str) {
        debug!(login_path, "redirecting to login");
        eprintln!(
            "{YELLOW}{BOLD}⚠{RESET} {YELLOW}session expired — run `vault login` to sign in again{RESET}"
        );
    }
}

// ── Setup ────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("cannot determine home directory (HOME / USERPROFILE not set)")
}

async fn build_client(addr: Option<String>, session_dir: Option<PathBuf>) -> Result<VaultClient> {
    let mut config = ClientConfig::from_env();
    if let Some(addr) = addr {
        config.base_url = ClientConfig::new(addr).base_url;
    }

    let dir = match session_dir {
        Some(dir) => dir,
        None => home_dir()?.join(".vault"),
    };
    let storage = FileBackend::open(&dir)
        .await
        .with_context(|| format!("failed to open session directory {}", dir.display()))?;

    VaultClient::with_redirect(config, Arc::new(storage), Arc::new(CliRedirect))
        .context("failed to build API client")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = build_client(cli.addr, cli.session_dir).await?;
    match cli.command {
        Commands::Login { email, password } => cmd_login(&client, &email, password).await,
        Commands::Logout => cmd_logout(&client).await,
        Commands::Whoami => cmd_whoami(&client).await,
        Commands::Request {
            method,
            path,
            data,
            query,
        } => cmd_request(&client, &method, &path, data.as_deref(), &query).await,
    }
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_login(client: &VaultClient, email: &str, password: Option<String>) -> Result<()> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        bail!("no password given — pass --password or set VAULT_PASSWORD");
    };

    let session = client
        .login(email, &password)
        .await
        .context("login failed")?;

    success(&format!(
        "Signed in as {BOLD}{}{RESET}",
        session.display_name().unwrap_or(email)
    ));
    let roles = session.roles();
    if !roles.is_empty() {
        kv_line("Roles", &roles.join(", "));
    }
    Ok(())
}

async fn cmd_logout(client: &VaultClient) -> Result<()> {
    if client.session().await.is_none() {
        warning("Not logged in");
        return Ok(());
    }
    client.logout().await.context("failed to remove session")?;
    success("Signed out");
    Ok(())
}

async fn cmd_whoami(client: &VaultClient) -> Result<()> {
    let Some(session) = client.session().await else {
        warning("Not logged in — run `vault login`");
        return Ok(());
    };

    header("◆", "Session");
    kv_line("User", session.display_name().unwrap_or("(unknown)"));
    let roles = session.roles();
    kv_line(
        "Roles",
        &if roles.is_empty() {
            "(none)".to_owned()
        } else {
            roles.join(", ")
        },
    );
    kv_line("Backend", &client.config().base_url);
    Ok(())
}

async fn cmd_request(
    client: &VaultClient,
    method: &str,
    path: &str,
    data: Option<&str>,
    query: &[String],
) -> Result<()> {
    let request = build_request(method, path, data, query)?;
    let body: Value = client
        .send_json(request)
        .await
        .with_context(|| format!("{} {path} failed", method.to_uppercase()))?;

    if !body.is_null() {
        let pretty = serde_json::to_string_pretty(&body).context("failed to format response")?;
        println!("{pretty}");
    }
    Ok(())
}

fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
    query: &[String],
) -> Result<ApiRequest> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{method}'"))?;

    let mut request = ApiRequest::new(method, path);
    for pair in query {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid --query '{pair}' — expected KEY=VALUE");
        };
        request = request.query(key, value);
    }
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.json(body);
    }
    Ok(request)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn build_request_parses_method_query_and_body() {
        let req = build_request(
            "post",
            "/chat",
            Some(r#"{"message":"hi"}"#),
            &["lang=en".to_owned()],
        )
        .unwrap();
        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.path(), "/chat");
    }

    #[test]
    fn build_request_rejects_bad_input() {
        assert!(build_request("GET", "/x", Some("{oops"), &[]).is_err());
        assert!(build_request("GET", "/x", None, &["novalue".to_owned()]).is_err());
        assert!(build_request("GE T", "/x", None, &[]).is_err());
    }
}
