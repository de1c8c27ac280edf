//! Toolchain configuration record.
//!
//! Loaded from a JSON file; unknown options and out-of-range values are
//! rejected at load time so a typo never silently disables a pass.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use umbra_ledger::LedgerConfig;
use umbra_transforms::PassKind;
use umbra_utils::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObfuscationOptions {
    /// Aggressiveness 1..=5; scales the optimizer's population.
    pub obfuscation_level: u32,
    pub enable_control_flow_flattening: bool,
    pub enable_instruction_substitution: bool,
    pub enable_string_encryption: bool,
    pub enable_bogus_control_flow: bool,
    pub enable_anti_analysis: bool,

    /// Generation budget for the evolutionary optimizer; zero disables
    /// the search and runs the enabled passes in registry order.
    pub genetic_generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,

    pub enable_ledger: bool,
    pub ledger_network: String,
    pub ledger_rpc_endpoint: String,
    pub ledger_chain_id: u64,
    pub ledger_contract_address: String,
    pub ledger_private_key: String,
    pub gas_limit: u64,
    pub gas_price_wei: u64,

    pub max_threads: usize,
    pub output_directory: PathBuf,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        let ledger = LedgerConfig::default();
        Self {
            obfuscation_level: 2,
            enable_control_flow_flattening: true,
            enable_instruction_substitution: true,
            enable_string_encryption: true,
            enable_bogus_control_flow: false,
            enable_anti_analysis: false,
            genetic_generations: 20,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            enable_ledger: false,
            ledger_network: ledger.network,
            ledger_rpc_endpoint: ledger.rpc_endpoint,
            ledger_chain_id: ledger.chain_id,
            ledger_contract_address: ledger.contract_address,
            ledger_private_key: ledger.private_key,
            gas_limit: ledger.gas_limit,
            gas_price_wei: ledger.gas_price_wei,
            max_threads: 4,
            output_directory: PathBuf::from("./output"),
        }
    }
}

impl ObfuscationOptions {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        let options: Self = serde_json::from_str(&text).map_err(|e| {
            let message = e.to_string();
            if message.starts_with("unknown field") {
                ConfigError::UnknownOption(message)
            } else {
                ConfigError::Parse(message)
            }
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=5).contains(&self.obfuscation_level) {
            return Err(ConfigError::InvalidLevel(self.obfuscation_level));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::OutOfRange {
                option: "mutation_rate".into(),
                message: format!("{} is not a probability", self.mutation_rate),
            });
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(ConfigError::OutOfRange {
                option: "crossover_rate".into(),
                message: format!("{} is not a probability", self.crossover_rate),
            });
        }
        if self.max_threads == 0 {
            return Err(ConfigError::OutOfRange {
                option: "max_threads".into(),
                message: "at least one thread is required".into(),
            });
        }
        let url = &self.ledger_rpc_endpoint;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::MalformedEndpoint(url.clone()));
        }
        Ok(())
    }

    /// The enabled passes, in registry order.
    pub fn enabled_passes(&self) -> Vec<PassKind> {
        umbra_transforms::ALL_PASSES
            .into_iter()
            .filter(|kind| match kind {
                PassKind::ControlFlowFlattening => self.enable_control_flow_flattening,
                PassKind::InstructionSubstitution => self.enable_instruction_substitution,
                PassKind::StringEncryption => self.enable_string_encryption,
                PassKind::BogusControlFlow => self.enable_bogus_control_flow,
                PassKind::AntiAnalysis => self.enable_anti_analysis,
            })
            .collect()
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            network: self.ledger_network.clone(),
            rpc_endpoint: self.ledger_rpc_endpoint.clone(),
            chain_id: self.ledger_chain_id,
            contract_address: self.ledger_contract_address.clone(),
            private_key: self.ledger_private_key.clone(),
            gas_limit: self.gas_limit,
            gas_price_wei: self.gas_price_wei,
            ..LedgerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_options_validate() {
        ObfuscationOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_level() {
        let options = ObfuscationOptions {
            obfuscation_level: 9,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidLevel(9))
        ));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let options = ObfuscationOptions {
            ledger_rpc_endpoint: "ftp://127.0.0.1".into(),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::MalformedEndpoint(_))
        ));
    }

    #[test]
    fn rejects_unknown_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"obfuscation_level": 3, "enable_teleport": true}"#)
            .unwrap();
        file.flush().unwrap();
        assert!(matches!(
            ObfuscationOptions::load(file.path()),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn enabled_passes_follow_flags() {
        let options = ObfuscationOptions {
            enable_control_flow_flattening: false,
            enable_bogus_control_flow: true,
            ..Default::default()
        };
        let passes = options.enabled_passes();
        assert!(!passes.contains(&PassKind::ControlFlowFlattening));
        assert!(passes.contains(&PassKind::BogusControlFlow));
    }
}
