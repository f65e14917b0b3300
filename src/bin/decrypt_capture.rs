//! decrypt_capture - recover a clip from its encrypted `.enc` file
//!
//! Uses the same `ENCRYPTION_KEY` as the daemon (read from the environment or
//! `tokens.env`). A tampered or truncated file is rejected and nothing is written.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use intruder_watch::vault::ENCRYPTED_EXTENSION;
use intruder_watch::{EncryptionKey, Encryptor};

#[derive(Parser, Debug)]
#[command(
    name = "decrypt_capture",
    about = "Decrypt an encrypted capture, or generate a new encryption key"
)]
struct Args {
    /// Encrypted capture (`motion_*.avi.enc`)
    #[arg(long, short, value_name = "PATH", required_unless_present = "generate_key")]
    input: Option<PathBuf>,

    /// Output path (default: input without the `.enc` suffix)
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Hex-encoded 256-bit key (default: ENCRYPTION_KEY)
    #[arg(long, value_name = "HEX", env = "ENCRYPTION_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Env file to load before reading ENCRYPTION_KEY
    #[arg(long, value_name = "PATH", default_value = "tokens.env")]
    env_file: PathBuf,

    /// Print a fresh random key and exit
    #[arg(long)]
    generate_key: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Seed the environment before clap reads ENCRYPTION_KEY.
    let env_file = env_file_arg().unwrap_or_else(|| PathBuf::from("tokens.env"));
    if env_file.exists() {
        dotenvy::from_path(&env_file)
            .with_context(|| format!("load {}", env_file.display()))?;
    }
    let args = Args::parse();

    if args.generate_key {
        println!("{}", EncryptionKey::generate().to_hex());
        return Ok(());
    }

    let input = args
        .input
        .ok_or_else(|| anyhow!("--input is required"))?;
    let key_hex = args
        .key
        .ok_or_else(|| anyhow!("no key: pass --key or set ENCRYPTION_KEY"))?;
    let key = EncryptionKey::from_hex(&key_hex)?;
    let output = match args.output {
        Some(path) => path,
        None => default_output(&input)?,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }

    Encryptor::new(key).decrypt(&input, &output)?;
    log::info!("decrypted {} -> {}", input.display(), output.display());
    Ok(())
}

/// `--env-file` has to be known before clap parses, because clap reads the key
/// from the environment during parsing.
fn env_file_arg() -> Option<PathBuf> {
    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let arg = arg.to_string_lossy().into_owned();
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(value) = arg.strip_prefix("--env-file=") {
            return Some(PathBuf::from(value));
        }
    }
    None
}

fn default_output(input: &Path) -> Result<PathBuf> {
    match input.extension() {
        Some(ext) if ext == ENCRYPTED_EXTENSION => Ok(input.with_extension("")),
        _ => Err(anyhow!(
            "{} has no .{} suffix; pass --output",
            input.display(),
            ENCRYPTED_EXTENSION
        )),
    }
}
