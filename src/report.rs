//! One CSV line of statistics per repetition of the experiment.

use crate::util::{hamming_distance, sum};
use spectre_pht::GuessResult;
use std::fmt;

pub const HEADER: &str =
    "total bytes,correct bytes,score sum,elapsed cycles,cache misses,branch mispredicted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentRecord {
    pub total_bytes: usize,
    pub correct_bytes: usize,
    pub score_sum: u64,
    pub elapsed_cycles: u64,
    pub cache_misses: u64,
    pub branch_misses: u64,
}

impl ExperimentRecord {
    /// Score the guesses against the secret they were aiming at.
    pub fn from_guesses(
        secret: &[u8],
        guesses: &[GuessResult],
        elapsed_cycles: u64,
        cache_misses: u64,
        branch_misses: u64,
    ) -> Self {
        let values: Vec<u8> = guesses.iter().map(|g| g.value).collect();
        // Missing guesses count as wrong.
        let wrong = hamming_distance(secret, &values) + secret.len().saturating_sub(values.len());
        ExperimentRecord {
            total_bytes: secret.len(),
            correct_bytes: secret.len().saturating_sub(wrong),
            score_sum: sum(guesses.iter().map(|g| g.score)),
            elapsed_cycles,
            cache_misses,
            branch_misses,
        }
    }

    pub fn csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.total_bytes,
            self.correct_bytes,
            self.score_sum,
            self.elapsed_cycles,
            self.cache_misses,
            self.branch_misses
        )
    }
}

impl fmt::Display for ExperimentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.csv())
    }
}
