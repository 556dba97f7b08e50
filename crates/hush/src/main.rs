use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use hush_core::{
    CipherKind, FileStore, RedbStore, SecretStore, Vault, DEFAULT_TTL_SECS, DEFAULT_VIEWS,
};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "hush",
    about = "One-time secrets: store once, share a reference, burn on read",
    version
)]
struct Cli {
    /// Directory holding the secret store (default: platform data dir)
    #[arg(long, env = "HUSH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, env = "HUSH_BACKEND", value_enum, default_value_t = Backend::Redb)]
    backend: Backend,

    /// Cipher name; retrieval must use the same cipher the secret was
    /// stored with
    #[arg(long, env = "HUSH_CIPHER", default_value = "aes-256-gcm")]
    cipher: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Single-file embedded database
    Redb,
    /// One JSON record per secret
    File,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a secret and print its one-time reference
    Store {
        /// The secret text; read from stdin when omitted
        text: Option<String>,
        /// TTL duration e.g. 1h, 30m, 7d (default: 1h)
        #[arg(long)]
        ttl: Option<String>,
        /// Number of retrievals before the secret burns
        #[arg(long, default_value_t = DEFAULT_VIEWS)]
        views: u32,
    },
    /// Redeem a reference and print the secret
    Retrieve {
        /// The `identifier;key` reference
        reference: String,
    },
    /// Delete all expired secrets immediately
    Prune,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUSH_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cipher = CipherKind::parse(&cli.cipher)?;
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.backend {
        Backend::Redb => {
            let store = RedbStore::open(data_dir.join("hush.db"))?;
            dispatch(Vault::with_cipher(store, cipher), cli.command)
        }
        Backend::File => {
            let store = FileStore::open(data_dir.join("records"))?;
            dispatch(Vault::with_cipher(store, cipher), cli.command)
        }
    }
}

fn dispatch<S: SecretStore>(vault: Vault<S>, command: Commands) -> Result<()> {
    match command {
        Commands::Store { text, ttl, views } => cmd_store(&vault, text, ttl.as_deref(), views),
        Commands::Retrieve { reference } => cmd_retrieve(&vault, &reference),
        Commands::Prune => cmd_prune(&vault),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

fn cmd_store<S: SecretStore>(
    vault: &Vault<S>,
    text: Option<String>,
    ttl: Option<&str>,
    views: u32,
) -> Result<()> {
    let text = match text {
        Some(t) => t,
        None => read_stdin()?,
    };
    let ttl_seconds = ttl.map(parse_duration).transpose()?.unwrap_or(DEFAULT_TTL_SECS);

    let reference = vault.store(&text, ttl_seconds, views)?;
    println!("{reference}");
    Ok(())
}

fn cmd_retrieve<S: SecretStore>(vault: &Vault<S>, reference: &str) -> Result<()> {
    let plaintext = vault.retrieve(reference)?;
    println!("{plaintext}");
    Ok(())
}

fn cmd_prune<S: SecretStore>(vault: &Vault<S>) -> Result<()> {
    let n = vault.prune()?;
    println!("pruned {n} expired secret(s)");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Resolve the directory holding hush data (`hush.db` or `records/`).
///
/// Priority:
/// 1. `--data-dir` / `HUSH_DATA_DIR`
/// 2. Platform-specific app data dir (`~/.local/share/hush/`, etc.)
fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        std::fs::create_dir_all(&path).context("create data dir")?;
        return Ok(path);
    }

    let dirs =
        ProjectDirs::from("", "", "hush").context("could not determine platform data directory")?;

    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}

/// Parse human duration strings like "1h", "30m", "7d", "5s" into seconds.
fn parse_duration(s: &str) -> Result<u64> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    Ok(d.as_secs())
}

/// Read the secret from stdin, dropping one trailing newline.
fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read secret from stdin")?;
    Ok(strip_trailing_newline(&buf).to_owned())
}

/// Drop a single trailing `\n` or `\r\n`; everything else, including earlier
/// trailing newlines, is part of the secret.
fn strip_trailing_newline(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}
