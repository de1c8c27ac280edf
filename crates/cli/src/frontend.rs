//! JSON module exchange.
//!
//! The real frontend (source lowering) and backend (native codegen) live
//! outside this toolchain; their wire format here is a serialized module.
//! `JsonFrontend` accepts what an external lowering step produced and
//! `JsonBackend` emits the transformed module for the external code
//! generator, returning the artifact path the integrity recorder hashes.

use std::path::{Path, PathBuf};
use umbra_core::contracts::{Backend, Frontend};
use umbra_core::Module;
use umbra_utils::errors::{BackendError, FrontendError};

pub struct JsonFrontend;

impl Frontend for JsonFrontend {
    fn lower(&self, source: &Path) -> Result<Module, FrontendError> {
        let text = std::fs::read_to_string(source).map_err(|e| FrontendError::SourceRead {
            path: source.display().to_string(),
            source: e,
        })?;
        let module: Module = serde_json::from_str(&text)
            .map_err(|e| FrontendError::Lowering(format!("invalid module: {e}")))?;
        umbra_core::verify_module(&module)
            .map_err(|e| FrontendError::Lowering(format!("malformed module: {e}")))?;
        Ok(module)
    }
}

pub struct JsonBackend;

impl Backend for JsonBackend {
    fn emit(&self, module: &Module, output_dir: &Path) -> Result<PathBuf, BackendError> {
        std::fs::create_dir_all(output_dir).map_err(|e| BackendError::ArtifactWrite {
            path: output_dir.display().to_string(),
            source: e,
        })?;
        let path = output_dir.join(format!("{}.obf.json", module.name));
        let text = serde_json::to_string_pretty(module)
            .map_err(|e| BackendError::Codegen(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| BackendError::ArtifactWrite {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::{Function, Linkage, Signature, Value};

    #[test]
    fn module_round_trips_through_the_backend() {
        let mut module = Module::new("demo");
        let i32_ty = module.types.int(32);
        let func = module.add_function(Function::new(
            "id",
            Signature {
                ret: i32_ty,
                params: vec![i32_ty],
            },
            Linkage::External,
        ));
        let mut b = module.builder(func);
        b.ret(Some(Value::Param(0)));

        let dir = tempfile::tempdir().unwrap();
        let path = JsonBackend.emit(&module, dir.path()).unwrap();
        let reloaded = JsonFrontend.lower(&path).unwrap();
        assert_eq!(reloaded.name, "demo");
        assert_eq!(format!("{reloaded}"), format!("{module}"));
    }
}
