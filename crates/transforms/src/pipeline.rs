//! Sequential pass driver.
//!
//! Runs a transform list in the supplied order against one module,
//! logging a metric delta per pass and collecting per-pass status into a
//! report. A failing pass is contained: the error is recorded, the
//! module keeps whatever edits landed before the failure, and the
//! pipeline continues with the next pass.

use crate::Transform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use umbra_analysis::{collect_metrics, compare, ModuleMetrics};
use umbra_core::Module;

/// Outcome of one transform within a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassStatus {
    pub name: String,
    pub changed: bool,
    pub error: Option<String>,
}

/// Outcome of a whole pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub success: bool,
    pub error_message: Option<String>,
    /// Seed the driver fed its RNG, recorded for reproducibility.
    pub seed: u64,
    pub passes: Vec<PassStatus>,
    pub metrics_before: ModuleMetrics,
    pub metrics_after: ModuleMetrics,
}

impl PipelineReport {
    pub fn modified(&self) -> bool {
        self.passes.iter().any(|p| p.changed)
    }
}

/// Runs `transforms` in order against `module`.
pub fn run_transforms(
    module: &mut Module,
    transforms: &[Box<dyn Transform>],
    seed: u64,
) -> PipelineReport {
    let mut rng = StdRng::seed_from_u64(seed);
    let metrics_before = collect_metrics(module);
    let mut passes = Vec::with_capacity(transforms.len());

    for transform in transforms {
        let before = collect_metrics(module);
        let status = match transform.apply(module, &mut rng) {
            Ok(changed) => {
                let after = collect_metrics(module);
                let delta = compare(&before, &after);
                info!(
                    "{:>24} Δ{:+.2} {}",
                    transform.name(),
                    delta,
                    if changed { "✓" } else { "·" }
                );
                PassStatus {
                    name: transform.name().to_string(),
                    changed,
                    error: None,
                }
            }
            Err(e) => {
                error!("{:>24} failed: {e}", transform.name());
                PassStatus {
                    name: transform.name().to_string(),
                    changed: false,
                    error: Some(e.to_string()),
                }
            }
        };

        // an invariant-corrupting pass is a programming error
        #[cfg(debug_assertions)]
        if let Err(e) = umbra_core::verify_module(module) {
            panic!("transform '{}' corrupted the module: {e}", transform.name());
        }

        passes.push(status);
    }

    let metrics_after = collect_metrics(module);
    PipelineReport {
        success: true,
        error_message: None,
        seed,
        passes,
        metrics_before,
        metrics_after,
    }
}
