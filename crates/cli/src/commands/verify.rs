//! The `verify` and `validate` subcommands.

use crate::config::ObfuscationOptions;
use clap::Args;
use std::error::Error;
use std::path::PathBuf;
use umbra_ledger::{hash_file, IntegrityRecorder};

#[derive(Args)]
pub struct VerifyArgs {
    /// Artifact file to hash and record
    pub artifact: PathBuf,
    /// Configuration file with ledger settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute_verify(args: VerifyArgs) -> Result<(), Box<dyn Error>> {
    let options = match &args.config {
        Some(path) => ObfuscationOptions::load(path)?,
        None => ObfuscationOptions::default(),
    };
    let mut recorder = IntegrityRecorder::connect(options.ledger_config()).await?;
    let record = recorder.verify_binary(&args.artifact).await;
    println!("{}", serde_json::to_string_pretty(&record)?);
    if !record.verified {
        std::process::exit(2);
    }
    Ok(())
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Artifact file to check
    pub artifact: PathBuf,
    /// Expected 0x-prefixed SHA-256 digest
    pub expected: String,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute_validate(args: ValidateArgs) -> Result<(), Box<dyn Error>> {
    let options = match &args.config {
        Some(path) => ObfuscationOptions::load(path)?,
        None => ObfuscationOptions::default(),
    };
    let recorder = IntegrityRecorder::offline(options.ledger_config());
    let valid = recorder.validate_integrity(&args.artifact, &args.expected);
    let actual = hash_file(&args.artifact)?;
    println!("expected: {}", args.expected);
    println!("actual:   {actual}");
    println!("integrity {}", if valid { "PASSED" } else { "FAILED" });
    if !valid {
        std::process::exit(2);
    }
    Ok(())
}
