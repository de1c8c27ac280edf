//! Contracts for the external frontend and backend.
//!
//! The toolchain neither parses source nor emits native code. A frontend
//! delivers a well-formed [`Module`]; a backend consumes the transformed
//! module and produces the artifact file whose path feeds the integrity
//! recorder.

use crate::module::Module;
use std::path::{Path, PathBuf};
use umbra_utils::errors::{BackendError, FrontendError};

/// Lowers a source translation unit into a well-formed IR module.
pub trait Frontend {
    fn lower(&self, source: &Path) -> Result<Module, FrontendError>;
}

/// Emits a module as a binary artifact, returning the artifact path.
pub trait Backend {
    fn emit(&self, module: &Module, output_dir: &Path) -> Result<PathBuf, BackendError>;
}
