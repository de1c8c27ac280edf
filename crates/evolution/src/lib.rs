//! Evolutionary search over obfuscation pass sequences.
//!
//! A genome is a sequence of pass identifiers; fitness runs the sequence
//! against a deep clone of the subject module and scores the outcome.
//! The search is a plain generational GA: tournament selection,
//! single-point crossover, point/insert/delete mutation, and elitism.

pub mod fitness;
pub mod genome;
pub mod optimizer;

pub use fitness::evaluate_genome;
pub use genome::Genome;
pub use optimizer::{GaParams, GeneticOptimizer};
