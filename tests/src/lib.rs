//! Cross-crate integration tests.
//!
//! Unit-level properties live next to the code they check; this crate
//! holds the scenarios that span crates: whole-pipeline semantic
//! equivalence, the evolutionary search end to end, and the integrity
//! recorder against a scripted ledger node.

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod ledger;
#[cfg(test)]
mod optimizer;
#[cfg(test)]
mod pipeline;

#[cfg(test)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init()
        .ok();
}
