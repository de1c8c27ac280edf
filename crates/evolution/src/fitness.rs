//! Genome fitness.
//!
//! `F = 0.5·S + 0.3·(100 − P) + 0.2·C`, where S, P and C are the
//! security, performance-impact and complexity scores of the trial
//! outcome, each in [0, 100]. Sequences longer than six passes pay a 10%
//! efficiency penalty; sequences drawing on at least three distinct
//! passes earn a 10% diversity bonus. The result is clamped to [0, 100].
//!
//! Every trial runs against a deep clone of the subject module, so the
//! caller's module is never touched and trials are order-independent.

use crate::genome::Genome;
use rand::rngs::StdRng;
use rand::SeedableRng;
use umbra_analysis::{collect_metrics, complexity_score, performance_impact, security_score};
use umbra_core::{verify_module, Module};
use umbra_transforms::PassConfig;
use umbra_utils::errors::OptimizerError;

/// Runs `genome`'s passes on a clone of `module` and scores the result.
pub fn evaluate_genome(
    module: &Module,
    genome: &Genome,
    config: &PassConfig,
    seed: u64,
) -> Result<f64, OptimizerError> {
    let mut trial = module.clone();
    let before = collect_metrics(&trial);
    let mut rng = StdRng::seed_from_u64(seed);

    for kind in genome.passes() {
        kind.instantiate(config).apply(&mut trial, &mut rng)?;
    }
    verify_module(&trial).map_err(|e| OptimizerError::Evaluation(e.to_string()))?;

    let after = collect_metrics(&trial);
    let security = security_score(&before, &after);
    let perf = performance_impact(&before, &after);
    let complexity = complexity_score(&after);

    let mut fitness = 0.5 * security + 0.3 * (100.0 - perf) + 0.2 * complexity;
    if genome.len() > 6 {
        fitness *= 0.9;
    }
    if genome.distinct_genes() >= 3 {
        fitness *= 1.1;
    }
    Ok(fitness.clamp(0.0, 100.0))
}
