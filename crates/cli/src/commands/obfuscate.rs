//! The `obfuscate` subcommand: module in, protected artifact out.

use crate::config::ObfuscationOptions;
use crate::frontend::{JsonBackend, JsonFrontend};
use clap::Args;
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use umbra_core::contracts::{Backend, Frontend};
use umbra_evolution::{GaParams, GeneticOptimizer};
use umbra_ledger::IntegrityRecorder;
use umbra_transforms::pipeline::run_transforms;
use umbra_transforms::{PassConfig, PassKind, Transform};

#[derive(Args)]
pub struct ObfuscateArgs {
    /// Lowered IR module as JSON (output of the external frontend)
    pub input: PathBuf,
    /// Configuration file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Random seed for the transform pipeline (default: 42)
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Skip the evolutionary search and run enabled passes in registry order
    #[arg(long)]
    pub no_search: bool,
    /// Path to write the run summary as JSON (stdout when omitted)
    #[arg(long)]
    pub emit: Option<PathBuf>,
}

pub async fn execute(args: ObfuscateArgs) -> Result<(), Box<dyn Error>> {
    let options = match &args.config {
        Some(path) => ObfuscationOptions::load(path)?,
        None => ObfuscationOptions::default(),
    };
    options.validate()?;

    let mut module = JsonFrontend.lower(&args.input)?;
    info!(
        "loaded module '{}' ({} functions, {} blocks)",
        module.name,
        module.num_functions(),
        module.block_count()
    );

    let enabled = options.enabled_passes();
    let pass_config = PassConfig::default();

    let search = !args.no_search && options.genetic_generations > 0 && !enabled.is_empty();
    let (sequence, fitness, optimizer_seed) = if search {
        let params = GaParams::for_level(
            options.obfuscation_level,
            options.genetic_generations,
            options.mutation_rate,
            options.crossover_rate,
        );
        let mut optimizer = GeneticOptimizer::new(params, pass_config.clone());
        let best = optimizer.optimize(&module)?;
        info!(
            "search selected {:?} (fitness {:.2})",
            best.genes, best.fitness
        );
        let sequence: Vec<PassKind> = best
            .passes()
            .into_iter()
            .filter(|kind| enabled.contains(kind))
            .collect();
        (sequence, optimizer.best_fitness(), Some(optimizer.seed()))
    } else {
        (enabled, 0.0, None)
    };

    let transforms: Vec<Box<dyn Transform>> = sequence
        .iter()
        .map(|kind| kind.instantiate(&pass_config))
        .collect();
    let report = run_transforms(&mut module, &transforms, args.seed);
    umbra_core::verify_module(&module)?;

    let artifact = JsonBackend.emit(&module, &options.output_directory)?;
    info!("artifact written to {}", artifact.display());

    let verification = if options.enable_ledger {
        let mut recorder = IntegrityRecorder::connect(options.ledger_config()).await?;
        Some(recorder.verify_binary(&artifact).await)
    } else {
        None
    };

    let summary = json!({
        "artifact": artifact,
        "sequence": sequence.iter().map(|k| k.name()).collect::<Vec<_>>(),
        "fitness": fitness,
        "optimizer_seed": optimizer_seed,
        "report": report,
        "verification": verification,
    });
    match &args.emit {
        Some(path) => std::fs::write(path, serde_json::to_string_pretty(&summary)?)?,
        None => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}
