use clap::Subcommand;
use std::error::Error;

pub mod obfuscate;
pub mod verify;

/// Umbra subcommands.
#[derive(Subcommand)]
pub enum Cmd {
    /// Obfuscate a lowered IR module and emit the protected artifact
    Obfuscate(obfuscate::ObfuscateArgs),
    /// Hash an artifact and record the digest on the ledger
    Verify(verify::VerifyArgs),
    /// Check an artifact against an expected digest
    Validate(verify::ValidateArgs),
}

impl Cmd {
    pub async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Obfuscate(args) => obfuscate::execute(args).await,
            Cmd::Verify(args) => verify::execute_verify(args).await,
            Cmd::Validate(args) => verify::execute_validate(args).await,
        }
    }
}
