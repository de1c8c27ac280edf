//! Module metrics and the scores derived from them.
//!
//! `collect_metrics` snapshots the countable shape of a module; the score
//! functions turn a before/after pair into the security, performance and
//! complexity components the optimizer combines into a fitness value.
//! Every score is clamped to [0, 100].

use serde::{Deserialize, Serialize};
use umbra_core::Module;

/// Countable shape of a module at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetrics {
    /// Function bodies (declarations excluded).
    pub functions: usize,
    /// Basic blocks across all bodies.
    pub blocks: usize,
    /// Placed instructions, terminators included.
    pub instructions: usize,
    /// CFG edges across all bodies.
    pub edges: usize,
}

pub fn collect_metrics(module: &Module) -> ModuleMetrics {
    ModuleMetrics {
        functions: module
            .functions()
            .filter(|(_, f)| !f.is_declaration())
            .count(),
        blocks: module.block_count(),
        instructions: module.inst_count(),
        edges: crate::cfg::edge_count(module),
    }
}

/// Signed complexity delta between two snapshots, used by the pass driver
/// to log what each transform bought.
pub fn compare(before: &ModuleMetrics, after: &ModuleMetrics) -> f64 {
    complexity_score(after) - complexity_score(before)
}

/// Security component: a weighted count of transformation-introduced
/// artifacts (added decoder functions, altered block counts) on a base of
/// fifty.
pub fn security_score(before: &ModuleMetrics, after: &ModuleMetrics) -> f64 {
    let mut score = 50.0;
    if after.functions > before.functions {
        score += (after.functions - before.functions) as f64 * 10.0;
    }
    if after.blocks > before.blocks {
        score += (after.blocks - before.blocks) as f64 * 2.0;
    }
    score.clamp(0.0, 100.0)
}

/// Performance-impact component: instruction bloat as a proxy for runtime
/// overhead. Zero when the module shrank or stayed put.
pub fn performance_impact(before: &ModuleMetrics, after: &ModuleMetrics) -> f64 {
    if before.instructions == 0 {
        return 0.0;
    }
    let bloat = after.instructions as f64 / before.instructions as f64;
    ((bloat - 1.0).max(0.0) * 50.0).clamp(0.0, 100.0)
}

/// Complexity component of the obfuscated module.
pub fn complexity_score(metrics: &ModuleMetrics) -> f64 {
    let raw = metrics.instructions as f64 * 0.5
        + metrics.blocks as f64 * 2.0
        + metrics.functions as f64 * 10.0;
    raw.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(functions: usize, blocks: usize, instructions: usize) -> ModuleMetrics {
        ModuleMetrics {
            functions,
            blocks,
            instructions,
            edges: 0,
        }
    }

    #[test]
    fn security_rewards_added_artifacts() {
        let before = shape(2, 4, 40);
        assert_eq!(security_score(&before, &before), 50.0);
        let after = shape(4, 10, 90);
        assert_eq!(security_score(&before, &after), 50.0 + 2.0 * 10.0 + 6.0 * 2.0);
        // shrinkage never goes below the base
        let shrunk = shape(1, 2, 10);
        assert_eq!(security_score(&before, &shrunk), 50.0);
    }

    #[test]
    fn performance_impact_measures_bloat_only() {
        let before = shape(1, 2, 100);
        let after = shape(1, 2, 150);
        assert_eq!(performance_impact(&before, &after), 25.0);
        let smaller = shape(1, 2, 80);
        assert_eq!(performance_impact(&before, &smaller), 0.0);
    }

    #[test]
    fn complexity_clamps_at_one_hundred() {
        assert_eq!(complexity_score(&shape(50, 100, 1000)), 100.0);
        assert_eq!(complexity_score(&shape(1, 2, 8)), 8.0 * 0.5 + 2.0 * 2.0 + 10.0);
    }
}
