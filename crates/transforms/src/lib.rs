//! Obfuscation transforms over the Umbra SSA-IR.
//!
//! Each transform edits a module in place and reports whether it changed
//! anything. Transforms must preserve the externally observable behavior
//! of every externally linked function, never perform I/O, and leave the
//! module invariant-respecting at exit; the driver asserts the latter in
//! debug builds.

pub mod anti_analysis;
pub mod bogus_flow;
pub mod flattening;
pub mod pipeline;
pub mod registry;
pub mod string_encryption;
pub mod substitution;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use umbra_core::Module;
use umbra_utils::errors::TransformError;

pub use registry::{PassKind, ALL_PASSES, PASS_COUNT};

/// Name prefix reserved for synthesized runtime helpers. Renaming skips
/// it, and transforms must not generate colliding user-visible names.
pub const RESERVED_PREFIX: &str = "umbra_";

/// Trait for IR obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the module, returning whether changes were made.
    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError>;
}

/// Configuration for transform passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Probability of inserting bogus control flow into an eligible block
    pub bogus_ratio: f64,
    /// Probability of inserting a junk sequence after an instruction
    pub junk_ratio: f64,
    /// Probability of adding an opaque-false fake jump to a block
    pub fake_jump_ratio: f64,
    /// Stack buffer length of synthesized string decoders, in bytes
    pub decoder_buffer_len: u64,
    /// Minimum block count before a function is worth flattening
    pub min_flatten_blocks: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            bogus_ratio: 0.3,
            junk_ratio: 0.1,
            fake_jump_ratio: 0.15,
            decoder_buffer_len: 1024,
            min_flatten_blocks: 3,
        }
    }
}
