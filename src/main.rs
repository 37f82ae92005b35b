#![forbid(unsafe_code)]
//! Command-line front end for chunkcrypt.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chunkcrypt::{
    ContainerKind, Credential, DEFAULT_CHUNK_SIZE, DEFAULT_STREAM_THRESHOLD, EncryptOptions,
    ProgressEvent, ProgressPhase, decrypt_file, encrypt_file, generate_keyfile, identify,
    parse_keyfile, write_keyfile,
};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "chunkcrypt",
    version,
    about = "Encrypt/decrypt files with a password or keyfile"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt a file (large files are streamed automatically)
    Enc(EncArgs),
    /// Decrypt a file of any supported format
    Dec(DecArgs),
    /// Generate a new keyfile
    Keygen(KeygenArgs),
    /// Show which container format a file uses
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct CredentialArgs {
    /// Read password from file instead of interactive prompt
    #[arg(short = 'p', long = "password-file", conflicts_with = "keyfile")]
    password_file: Option<PathBuf>,

    /// Use the raw key from a keyfile instead of a password
    #[arg(short = 'k', long = "keyfile")]
    keyfile: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EncArgs {
    /// Input file
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Output file (encrypted). If omitted, ".enc" is appended.
    #[arg(short = 'o', long = "out")]
    output: Option<PathBuf>,

    #[command(flatten)]
    cred: CredentialArgs,

    /// Overwrite output if it exists
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Always use the streaming format
    #[arg(long)]
    stream: bool,

    /// Plaintext bytes per chunk in streaming mode
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Files at least this large are streamed even without --stream
    #[arg(long, default_value_t = DEFAULT_STREAM_THRESHOLD)]
    stream_threshold: u64,

    /// Print progress to stderr
    #[arg(long)]
    progress: bool,
}

#[derive(Args, Debug)]
struct DecArgs {
    /// Input file (encrypted)
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Output file (plaintext). If omitted, ".enc" is stripped or ".dec" is appended.
    #[arg(short = 'o', long = "out")]
    output: Option<PathBuf>,

    #[command(flatten)]
    cred: CredentialArgs,

    /// Overwrite the output file if it already exists.
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Print progress to stderr
    #[arg(long)]
    progress: bool,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Where to write the keyfile JSON
    #[arg(short = 'o', long = "out")]
    output: PathBuf,

    #[arg(short = 'f', long = "force")]
    force: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Container to inspect
    file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Enc(a) => cmd_enc(a),
        Command::Dec(a) => cmd_dec(a),
        Command::Keygen(a) => cmd_keygen(a),
        Command::Inspect(a) => cmd_inspect(a),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "chunkcrypt=debug",
        _ => "chunkcrypt=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_password(password_file: &Option<PathBuf>, prompt: &str) -> Result<SecretString> {
    if let Some(path) = password_file {
        let mut s = String::new();
        fs::File::open(path)?.read_to_string(&mut s)?;

        let secret = SecretString::new(
            s.trim_end_matches(&['\r', '\n'][..]).to_owned().into_boxed_str(),
        );

        use zeroize::Zeroize;
        s.zeroize();
        Ok(secret)
    } else {
        let pw = rpassword::prompt_password(prompt)?;
        Ok(SecretString::new(pw.into_boxed_str()))
    }
}

fn read_credential(args: &CredentialArgs) -> Result<Credential> {
    if let Some(path) = &args.keyfile {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read keyfile {}", path.display()))?;
        let record = parse_keyfile(&text).context("invalid keyfile")?;
        return Ok(record.credential()?);
    }
    Ok(Credential::Password(read_password(
        &args.password_file,
        "Password: ",
    )?))
}

fn progress_printer() -> impl FnMut(&ProgressEvent) {
    let mut last_pct = u32::MAX;
    move |e: &ProgressEvent| {
        if e.phase == ProgressPhase::Complete {
            eprintln!("\rdone: {} chunks, {} bytes   ", e.processed_chunks, e.processed_bytes);
            return;
        }
        if let Some(p) = e.progress {
            let pct = (p * 100.0) as u32;
            if pct != last_pct {
                last_pct = pct;
                eprint!("\r{pct:3}%");
            }
        }
    }
}

fn cmd_enc(a: EncArgs) -> Result<()> {
    let cred = read_credential(&a.cred)?;
    let opts = EncryptOptions {
        stream: a.stream,
        chunk_size: a.chunk_size,
        stream_threshold: a.stream_threshold,
    };
    let progress = a
        .progress
        .then(|| Box::new(progress_printer()) as chunkcrypt::ProgressFn<'static>);

    let out = encrypt_file(&a.input, a.output.as_deref(), &cred, &opts, a.force, progress)
        .with_context(|| "encryption failed")?;

    eprintln!("Wrote {}", out.display());
    Ok(())
}

fn cmd_dec(a: DecArgs) -> Result<()> {
    let cred = read_credential(&a.cred)?;
    let progress = a
        .progress
        .then(|| Box::new(progress_printer()) as chunkcrypt::ProgressFn<'static>);

    let out = decrypt_file(&a.input, a.output.as_deref(), &cred, a.force, progress)
        .with_context(|| "decryption failed")?;

    eprintln!("Wrote {}", out.display());
    Ok(())
}

fn cmd_keygen(a: KeygenArgs) -> Result<()> {
    let record = generate_keyfile()?;
    write_keyfile(&a.output, &record, a.force)
        .with_context(|| format!("failed to write {}", a.output.display()))?;
    eprintln!("Wrote keyfile {}", a.output.display());
    Ok(())
}

fn cmd_inspect(a: InspectArgs) -> Result<()> {
    let mut first = [0u8; 1];
    let n = fs::File::open(&a.file)?.read(&mut first)?;
    let info = identify(&first[..n]);
    let kind = match info.kind {
        ContainerKind::Password => "password",
        ContainerKind::Keyfile => "keyfile",
        ContainerKind::Unknown => anyhow::bail!("not a chunkcrypt container"),
    };
    let mode = if info.is_streaming { "streaming" } else { "whole" };
    println!("{kind} {mode}");
    Ok(())
}
