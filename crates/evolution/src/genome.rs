//! Pass-sequence genomes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use umbra_transforms::{PassKind, PASS_COUNT};

/// Shortest and longest genome the search will ever hold.
pub const MIN_GENOME_LEN: usize = 1;
pub const MAX_GENOME_LEN: usize = 15;

/// A candidate pass sequence paired with its fitness score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    /// Pass indices into the genome alphabet, each in `[0, PASS_COUNT)`.
    pub genes: Vec<usize>,
    /// Fitness in `[0, 100]`; zero until evaluated.
    pub fitness: f64,
}

impl Genome {
    pub fn new(genes: Vec<usize>) -> Self {
        Self {
            genes,
            fitness: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Length bounds and alphabet membership.
    pub fn is_valid(&self) -> bool {
        (MIN_GENOME_LEN..=MAX_GENOME_LEN).contains(&self.genes.len())
            && self.genes.iter().all(|&g| g < PASS_COUNT)
    }

    /// The concrete passes this genome encodes, in order.
    pub fn passes(&self) -> Vec<PassKind> {
        self.genes
            .iter()
            .filter_map(|&g| PassKind::from_index(g))
            .collect()
    }

    pub fn distinct_genes(&self) -> usize {
        self.genes.iter().collect::<HashSet<_>>().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_bounds() {
        assert!(Genome::new(vec![0]).is_valid());
        assert!(Genome::new(vec![0; 15]).is_valid());
        assert!(!Genome::new(vec![]).is_valid());
        assert!(!Genome::new(vec![0; 16]).is_valid());
        assert!(!Genome::new(vec![PASS_COUNT]).is_valid());
    }

    #[test]
    fn distinct_gene_count() {
        assert_eq!(Genome::new(vec![0, 0, 1, 2, 2]).distinct_genes(), 3);
    }
}
