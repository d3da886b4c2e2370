//! Z3R0 command line
//!
//! ```text
//! z3r0 generate --email a@example.com [--algorithm curve25519] [--name Alice]
//! z3r0 encrypt  --recipient alice.asc [--recipient bob.asc] [--input msg.txt]
//! z3r0 decrypt  --key alice-private.asc [--input msg.asc]
//! ```
//!
//! Passphrases come from `Z3R0_PASSPHRASE` or `--passphrase-file`, never
//! from the command line. Armored output goes to stdout, logs to stderr.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use zeroize::Zeroizing;

use z3r0_core::error::ErrorReport;
use z3r0_core::{Algorithm, CancelToken, CodecConfig, Session};

const PASSPHRASE_ENV: &str = "Z3R0_PASSPHRASE";

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "z3r0", version, about = "OpenPGP key generation, encryption and decryption")]
struct Args {
    /// TOML codec configuration file
    #[arg(long, global = true, env = "Z3R0_CONFIG")]
    config: Option<PathBuf>,

    /// Read the passphrase from this file instead of Z3R0_PASSPHRASE
    #[arg(long, global = true)]
    passphrase_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key pair and print both armored halves
    Generate {
        /// Email address for the user ID
        #[arg(long)]
        email: String,

        /// curve25519, ed25519, p256, p384, p521, rsa2048, rsa3072 or rsa4096
        #[arg(long, default_value_t = Algorithm::Curve25519)]
        algorithm: Algorithm,

        /// Display name placed before the email
        #[arg(long)]
        name: Option<String>,

        /// Write the private key here instead of stdout
        #[arg(long)]
        private_out: Option<PathBuf>,
    },

    /// Encrypt stdin (or --input) to one or more certificates
    Encrypt {
        /// Armored public key file; repeat for several recipients
        #[arg(long, required = true)]
        recipient: Vec<PathBuf>,

        /// Plaintext file (defaults to stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Decrypt stdin (or --input) with a private key
    Decrypt {
        /// Armored private key file
        #[arg(long)]
        key: PathBuf,

        /// Armored message file (defaults to stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Attach the core error code so failures read `[302 WrongPassphrase] ...`
fn report(err: z3r0_core::Error) -> color_eyre::Report {
    eyre!("{}", ErrorReport::from(err))
}

fn load_config(path: Option<&Path>) -> Result<CodecConfig> {
    match path {
        Some(path) => CodecConfig::from_file(path).map_err(report),
        None => Ok(CodecConfig::default()),
    }
}

fn read_passphrase(file: Option<&Path>) -> Result<Zeroizing<String>> {
    let mut passphrase = match file {
        Some(path) => Zeroizing::new(
            std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading passphrase file {}", path.display()))?,
        ),
        None => Zeroizing::new(std::env::var(PASSPHRASE_ENV).wrap_err_with(|| {
            format!("set {} or pass --passphrase-file", PASSPHRASE_ENV)
        })?),
    };
    let trimmed = passphrase.trim_end_matches(['\r', '\n']).len();
    passphrase.truncate(trimmed);
    Ok(passphrase)
}

fn read_text(path: Option<&Path>) -> Result<String> {
    let mut text = String::new();
    match path {
        Some(path) => {
            text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading {}", path.display()))?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut text)
                .wrap_err("reading stdin")?;
        }
    }
    Ok(text)
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn generate(
    session: Session,
    email: String,
    name: Option<String>,
    algorithm: Algorithm,
    passphrase: Zeroizing<String>,
    private_out: Option<PathBuf>,
) -> Result<()> {
    let cancel = CancelToken::new();
    let task = session.spawn_generate(name, email, passphrase, algorithm, cancel.clone());
    tokio::pin!(task);

    let pair = tokio::select! {
        generated = &mut task => generated.map_err(report)?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            tracing::warn!("Cancelling key generation");
            let _ = task.await;
            return Err(report(z3r0_core::Error::Cancelled));
        }
    };

    write_stdout(&pair.public_key)?;
    match private_out {
        Some(path) => {
            std::fs::write(&path, pair.private_key.as_bytes())
                .wrap_err_with(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote private key");
        }
        None => write_stdout(&pair.private_key)?,
    }
    tracing::info!(fingerprint = %pair.fingerprint, "Generated key pair");
    Ok(())
}

fn encrypt(session: &Session, recipients: &[PathBuf], input: Option<&Path>) -> Result<()> {
    let certificates = recipients
        .iter()
        .map(|path| read_text(Some(path)))
        .collect::<Result<Vec<_>>>()?;
    let certificates: Vec<&str> = certificates.iter().map(String::as_str).collect();
    let message = Zeroizing::new(read_text(input)?);

    let armored = session
        .encrypt_to_many(&message, &certificates)
        .map_err(report)?;
    write_stdout(&armored)
}

fn decrypt(session: &Session, key: &Path, input: Option<&Path>, passphrase: &str) -> Result<()> {
    let private_key = Zeroizing::new(read_text(Some(key))?);
    let message = read_text(input)?;
    let plaintext = Zeroizing::new(
        session
            .decrypt(&message, &private_key, passphrase)
            .map_err(report)?,
    );
    write_stdout(&plaintext)
}

// ── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "z3r0=info,z3r0_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let session = Session::new(config).map_err(report)?;
    let build = z3r0_core::build_info();
    tracing::debug!(
        version = build.version,
        target = build.target,
        profile = build.profile,
        "Starting z3r0"
    );

    match args.command {
        Command::Generate {
            email,
            algorithm,
            name,
            private_out,
        } => {
            let passphrase = read_passphrase(args.passphrase_file.as_deref())?;
            generate(session, email, name, algorithm, passphrase, private_out).await
        }
        Command::Encrypt { recipient, input } => encrypt(&session, &recipient, input.as_deref()),
        Command::Decrypt { key, input } => {
            let passphrase = read_passphrase(args.passphrase_file.as_deref())?;
            decrypt(&session, &key, input.as_deref(), &passphrase)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parses_generate() {
        let args = Args::try_parse_from([
            "z3r0",
            "generate",
            "--email",
            "a@example.com",
            "--algorithm",
            "p384",
        ])
        .unwrap();
        match args.command {
            Command::Generate { email, algorithm, .. } => {
                assert_eq!(email, "a@example.com");
                assert_eq!(algorithm, Algorithm::P384);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        assert!(Args::try_parse_from(["z3r0", "generate", "--email", "a@b", "--algorithm", "dsa"]).is_err());
    }

    #[test]
    fn test_encrypt_needs_recipient() {
        assert!(Args::try_parse_from(["z3r0", "encrypt"]).is_err());
    }

    #[test]
    fn test_passphrase_file_strips_newline() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "correct-horse\n").unwrap();
        let passphrase = read_passphrase(Some(file.path())).unwrap();
        assert_eq!(passphrase.as_str(), "correct-horse");
    }

    #[test]
    fn test_missing_config_reports_code() {
        let err = load_config(Some(Path::new("/nonexistent/z3r0.toml"))).unwrap_err();
        assert!(err.to_string().starts_with("[502"));
    }
}
