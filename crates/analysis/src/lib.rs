//! Analytical metrics over IR modules.
//!
//! Used two ways: the pass driver logs metric deltas per transform, and
//! the evolutionary optimizer derives its fitness components from the
//! before/after pair of a fitness trial.

pub mod cfg;
pub mod metrics;

pub use cfg::{function_cfg, reachable_blocks};
pub use metrics::{
    collect_metrics, compare, complexity_score, performance_impact, security_score, ModuleMetrics,
};
