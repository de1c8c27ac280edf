//! Evolutionary search end to end.

use crate::fixtures::{chain_program, sample_program};
use umbra_evolution::{evaluate_genome, GaParams, Genome, GeneticOptimizer};
use umbra_transforms::{PassConfig, PASS_COUNT};

fn search_params() -> GaParams {
    GaParams {
        population_size: 10,
        generations: 5,
        ..GaParams::default()
    }
}

#[test]
fn search_improves_or_holds_best_fitness() {
    let module = chain_program(50);
    let mut optimizer = GeneticOptimizer::with_seed(search_params(), PassConfig::default(), 1234);
    let best = optimizer.optimize(&module).unwrap();

    assert!(best.is_valid());
    assert!(best.genes.iter().all(|&g| g < PASS_COUNT));
    let history = optimizer.fitness_history();
    assert_eq!(history.len(), 5);
    assert!(
        history[4] + 1e-9 >= history[0],
        "generation 5 best {} fell below generation 0 best {}",
        history[4],
        history[0]
    );
}

#[test]
fn winning_genome_drives_a_clean_final_run() {
    let module = sample_program();
    let mut optimizer = GeneticOptimizer::with_seed(search_params(), PassConfig::default(), 77);
    let best = optimizer.optimize(&module).unwrap();

    // consuming the winner against the real module must reproduce a score
    // in bounds and leave the subject untouched until the caller commits
    let snapshot = format!("{module}");
    let fitness = evaluate_genome(&module, &best, &PassConfig::default(), 5).unwrap();
    assert!((0.0..=100.0).contains(&fitness));
    assert_eq!(format!("{module}"), snapshot);
}

#[test]
fn hand_built_genomes_score_in_bounds() {
    let module = sample_program();
    for genes in [
        vec![0],
        vec![1, 1, 1, 1, 1, 1, 1],
        vec![0, 1, 2, 3, 4],
        vec![2, 2],
    ] {
        let genome = Genome::new(genes.clone());
        let fitness = evaluate_genome(&module, &genome, &PassConfig::default(), 9).unwrap();
        assert!(
            (0.0..=100.0).contains(&fitness),
            "genome {genes:?} scored {fitness}"
        );
    }
}
