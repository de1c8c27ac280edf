//! Explicit pass registry.
//!
//! The pass set is a closed table: the optimizer's genome alphabet indexes
//! into [`ALL_PASSES`], and `instantiate` is the only constructor the
//! driver and the optimizer use. No runtime discovery.

use crate::anti_analysis::AntiAnalysis;
use crate::bogus_flow::BogusControlFlow;
use crate::flattening::ControlFlowFlattening;
use crate::string_encryption::StringEncryption;
use crate::substitution::InstructionSubstitution;
use crate::{PassConfig, Transform};
use serde::{Deserialize, Serialize};

/// Identifier of a concrete obfuscation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    ControlFlowFlattening,
    InstructionSubstitution,
    StringEncryption,
    BogusControlFlow,
    AntiAnalysis,
}

/// Every pass, in genome-alphabet order.
pub const ALL_PASSES: [PassKind; 5] = [
    PassKind::ControlFlowFlattening,
    PassKind::InstructionSubstitution,
    PassKind::StringEncryption,
    PassKind::BogusControlFlow,
    PassKind::AntiAnalysis,
];

/// Size of the genome alphabet.
pub const PASS_COUNT: usize = ALL_PASSES.len();

impl PassKind {
    pub fn from_index(index: usize) -> Option<PassKind> {
        ALL_PASSES.get(index).copied()
    }

    pub fn index(self) -> usize {
        ALL_PASSES.iter().position(|&k| k == self).unwrap_or(0)
    }

    pub fn name(self) -> &'static str {
        match self {
            PassKind::ControlFlowFlattening => "control_flow_flattening",
            PassKind::InstructionSubstitution => "instruction_substitution",
            PassKind::StringEncryption => "string_encryption",
            PassKind::BogusControlFlow => "bogus_control_flow",
            PassKind::AntiAnalysis => "anti_analysis",
        }
    }

    pub fn instantiate(self, config: &PassConfig) -> Box<dyn Transform> {
        match self {
            PassKind::ControlFlowFlattening => {
                Box::new(ControlFlowFlattening::new(config.clone()))
            }
            PassKind::InstructionSubstitution => Box::new(InstructionSubstitution),
            PassKind::StringEncryption => Box::new(StringEncryption::new(config.clone())),
            PassKind::BogusControlFlow => Box::new(BogusControlFlow::new(config.clone())),
            PassKind::AntiAnalysis => Box::new(AntiAnalysis::new(config.clone())),
        }
    }
}
