//! Archivist CLI - session, record and upload commands.
//!
//! Logs in against the configured auth API, keeps the session between runs,
//! edits rows of the spreadsheet-backed resource list and uploads files to
//! the Internet Archive.

mod commands;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use archivist_core::auth::{self, CredentialStore};
use archivist_core::{Config, FileStore, HttpAuthBackend, SessionStore};

// ============================================================================
// Constants
// ============================================================================

/// Log file name prefix inside the data directory's `logs/` folder
const LOG_FILE_PREFIX: &str = "archivist.log";

/// Create `<data_dir>/logs`, returning it only if it is usable.
/// File logging is skipped otherwise; the appender panics on a missing directory.
fn prepare_log_dir(data_dir: &Path) -> Option<PathBuf> {
    let dir = data_dir.join("logs");
    match std::fs::create_dir_all(&dir) {
        Ok(()) if dir.is_dir() => Some(dir),
        Ok(()) => None,
        Err(e) => {
            eprintln!("Warning: file logging disabled, cannot create {} ({})", dir.display(), e);
            None
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Stderr gets `RUST_LOG` filtering (default `warn`); the daily log file
/// records `info` and above when the data directory is available.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter))
        .with(file_layer)
        .init();

    guard
}

fn print_usage() {
    eprintln!(
        "Usage: archivist <command> [args]

Session:
  login [identifier]                   Log in (prompts for the password)
  signup <name> <identifier> [avatar]  Create an account (does not log in)
  logout                               Forget the current session
  whoami                               Show the current user

Records:
  records list
  records create key=value...
  records update <id> key=value...
  records delete <id>

Archive:
  upload <path> <container> [content-type]
  set-secret                           Store the archive secret key in the keychain
  clear-secret                         Remove the archive secret key from the keychain"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            let mut config = Config::default();
            config.apply_env(|name| std::env::var(name).ok());
            config
        }
    };

    let data_dir = config.data_dir().ok();
    let log_dir = data_dir.as_deref().and_then(prepare_log_dir);
    let _log_guard = init_tracing(log_dir.as_deref());
    info!("archivist starting");

    if config.archive.secret_key.is_none() {
        config.archive.secret_key = CredentialStore::archive_secret();
        debug!(found = config.archive.secret_key.is_some(), "Checked keychain for archive secret");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };
    let rest = &args[1..];

    let session_dir = data_dir
        .unwrap_or_else(|| PathBuf::from("./archivist-data"))
        .join("session");
    let storage = Arc::new(FileStore::new(session_dir)?);
    let backend = Arc::new(HttpAuthBackend::new(config.auth_base_url.clone())?);
    let session = Arc::new(SessionStore::open(backend, storage));

    let result = auth::scope(session, async {
        match command {
            "login" => commands::login(&mut config, rest.first().map(String::as_str)).await,
            "signup" => commands::signup(rest).await,
            "logout" => {
                commands::logout();
                Ok(())
            }
            "whoami" => {
                commands::whoami();
                Ok(())
            }
            "records" => commands::records(&config, rest).await,
            "upload" => commands::upload(&config, rest).await,
            "set-secret" => commands::set_secret(),
            "clear-secret" => commands::clear_secret(),
            "help" | "--help" | "-h" => {
                print_usage();
                Ok(())
            }
            other => {
                print_usage();
                Err(anyhow::anyhow!("Unknown command: {}", other))
            }
        }
    })
    .await;

    if let Err(ref e) = result {
        warn!(error = %e, command, "Command failed");
    }
    info!("archivist shutting down");
    result
}
