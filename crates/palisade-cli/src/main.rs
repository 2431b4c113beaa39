//! Command-line tool for Palisade
//!
//! Validates and normalizes rules, manifest and policy documents, and binds
//! and signs manifests for an identity certificate.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "palisade")]
#[command(about = "Palisade - security manifests, policies and certificates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Kind of XML document
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentKind {
    /// Standalone `<rules>` document (manifest template)
    Rules,
    /// Signed `<manifest>`
    Manifest,
    /// `<policy>`
    Policy,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a document against its schema
    Validate {
        /// Document kind
        #[arg(value_enum)]
        kind: DocumentKind,
        /// Document file
        file: PathBuf,
    },

    /// Parse a document and print it normalized
    Convert {
        /// Document kind
        #[arg(value_enum)]
        kind: DocumentKind,
        /// Document file
        file: PathBuf,
    },

    /// Print the hex digest a manifest signer must sign
    Digest {
        /// Unsigned `<rules>` document
        #[arg(short, long)]
        manifest: PathBuf,
        /// PEM identity chain, leaf first
        #[arg(short, long)]
        identity: PathBuf,
    },

    /// Bind and sign a manifest, printing the signed XML
    Sign {
        /// Unsigned `<rules>` document
        #[arg(short, long)]
        manifest: PathBuf,
        /// PEM identity chain, leaf first
        #[arg(short, long)]
        identity: PathBuf,
        /// PKCS#8 PEM private key of the identity issuer
        #[arg(short, long)]
        key: PathBuf,
    },

    /// Print the SHA-256 thumbprint of a certificate
    Thumbprint {
        /// PEM certificate or chain; the first certificate is used
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = config::load(cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Validate { kind, file } => commands::validate(kind, &file)?,
        Commands::Convert { kind, file } => commands::convert(kind, &file)?,
        Commands::Digest { manifest, identity } => commands::digest(&manifest, &identity, &config)?,
        Commands::Sign {
            manifest,
            identity,
            key,
        } => commands::sign(&manifest, &identity, &key, &config)?,
        Commands::Thumbprint { file } => commands::thumbprint(&file)?,
    };
    println!("{output}");

    Ok(())
}
