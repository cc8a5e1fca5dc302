//! passport: developer CLI for the message protection core
//!
//! Commands:
//!   keygen <user>                    - get or create a user's message key
//!   encrypt -u <user> <text>         - print an envelope as JSON
//!   decrypt -u <user> [<file>|-]     - decrypt an envelope read from file or stdin
//!   bulk-encrypt / bulk-decrypt      - transform a JSON array of messages
//!   hash <text>                      - SHA-256 hex digest
//!   verify <original> <decrypted>    - exact round-trip comparison
//!   mentions / hashtags / segments   - text entity extraction
//!   config show                      - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use passport_core::PassportConfig;
use passport_crypto::{hash_string, verify_message_integrity, ChatMessage, EncryptedEnvelope};
use passport_secrets::{get_or_create_encryption_key, open_key_store};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "passport",
    version,
    about = "Passport message protection tools",
    long_about = "passport: manage message keys, encrypt and decrypt direct messages, and extract mentions and hashtags"
)]
struct Cli {
    /// Path to passport.toml configuration file
    #[arg(long, short = 'c', env = "PASSPORT_CONFIG", default_value = "passport.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "PASSPORT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "PASSPORT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the user's message key, creating it if needed
    Keygen {
        user: String,
    },

    /// Encrypt a message and print the envelope JSON
    Encrypt {
        #[arg(long, short = 'u')]
        user: String,
        plaintext: String,
    },

    /// Decrypt an envelope JSON document
    Decrypt {
        #[arg(long, short = 'u')]
        user: String,
        /// Envelope file ("-" or omitted reads stdin)
        input: Option<PathBuf>,
    },

    /// Encrypt every plaintext message in a JSON array
    #[command(name = "bulk-encrypt")]
    BulkEncrypt {
        #[arg(long, short = 'u')]
        user: String,
        /// JSON array of messages ("-" or omitted reads stdin)
        input: Option<PathBuf>,
    },

    /// Decrypt every encrypted message in a JSON array
    #[command(name = "bulk-decrypt")]
    BulkDecrypt {
        #[arg(long, short = 'u')]
        user: String,
        input: Option<PathBuf>,
    },

    /// SHA-256 of the text as lowercase hex
    Hash {
        text: String,
    },

    /// Compare an original and a decrypted message byte for byte
    Verify {
        original: String,
        decrypted: String,
    },

    /// List @mentions as JSON
    Mentions {
        text: String,
    },

    /// List distinct #hashtags as JSON
    Hashtags {
        text: String,
    },

    /// Split text into plain, mention and hashtag segments as JSON
    Segments {
        text: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = PassportConfig::load_if_present(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    let config_found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    init_logging(&cli, &config);
    if !config_found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "passport starting"
    );

    match cli.command {
        Commands::Keygen { user } => cmd_keygen(&config, &user),
        Commands::Encrypt { user, plaintext } => cmd_encrypt(&config, &user, &plaintext),
        Commands::Decrypt { user, input } => cmd_decrypt(&config, &user, input.as_deref()).await,
        Commands::BulkEncrypt { user, input } => {
            cmd_bulk(&config, &user, input.as_deref(), BulkMode::Encrypt).await
        }
        Commands::BulkDecrypt { user, input } => {
            cmd_bulk(&config, &user, input.as_deref(), BulkMode::Decrypt).await
        }
        Commands::Hash { text } => {
            println!("{}", hash_string(&text));
            Ok(())
        }
        Commands::Verify { original, decrypted } => {
            println!("{}", verify_message_integrity(&original, &decrypted));
            Ok(())
        }
        Commands::Mentions { text } => print_json(&passport_text::extract_mentions(&text)),
        Commands::Hashtags { text } => print_json(&passport_text::extract_hashtags(&text)),
        Commands::Segments { text } => print_json(&passport_text::segment(&text)),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(cli: &Cli, config: &PassportConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });

    // logs go to stderr so stdout stays machine-readable
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn user_key(config: &PassportConfig, user: &str) -> Result<SecretString> {
    let store = open_key_store(&config.keys);
    get_or_create_encryption_key(store.as_ref(), user)
        .with_context(|| format!("resolving message key for '{user}'"))
}

async fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── `passport keygen` ─────────────────────────────────────────────────────────

fn cmd_keygen(config: &PassportConfig, user: &str) -> Result<()> {
    let key = user_key(config, user)?;
    println!("{}", key.expose_secret());
    Ok(())
}

// ── `passport encrypt` / `passport decrypt` ──────────────────────────────────

fn cmd_encrypt(config: &PassportConfig, user: &str, plaintext: &str) -> Result<()> {
    let key = user_key(config, user)?;
    let envelope = config
        .crypto
        .message_cipher()
        .encrypt(plaintext, key.expose_secret())
        .context("encrypting message")?;
    print_json(&envelope)
}

async fn cmd_decrypt(config: &PassportConfig, user: &str, input: Option<&Path>) -> Result<()> {
    let raw = read_input(input).await?;
    let envelope: EncryptedEnvelope =
        serde_json::from_str(&raw).context("parsing envelope JSON")?;
    let key = user_key(config, user)?;
    let plaintext = config
        .crypto
        .message_cipher()
        .decrypt(&envelope, key.expose_secret())
        .context("decrypting message")?;
    println!("{plaintext}");
    Ok(())
}

// ── `passport bulk-encrypt` / `passport bulk-decrypt` ────────────────────────

#[derive(Clone, Copy, Debug)]
enum BulkMode {
    Encrypt,
    Decrypt,
}

async fn cmd_bulk(
    config: &PassportConfig,
    user: &str,
    input: Option<&Path>,
    mode: BulkMode,
) -> Result<()> {
    let raw = read_input(input).await?;
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&raw).context("parsing messages JSON array")?;
    let count = messages.len();
    let key = user_key(config, user)?;
    let cipher = config.crypto.message_cipher();

    let out = tokio::task::spawn_blocking(move || match mode {
        BulkMode::Encrypt => cipher.encrypt_messages(messages, key.expose_secret()),
        BulkMode::Decrypt => cipher.decrypt_messages(messages, key.expose_secret()),
    })
    .await
    .context("bulk worker panicked")?
    .with_context(|| format!("bulk {mode:?} of {count} messages"))?;

    tracing::info!(count, mode = ?mode, "bulk transform complete");
    print_json(&out)
}

// ── `passport config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &PassportConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    print!("{}", config.to_toml_string()?);
    Ok(())
}
