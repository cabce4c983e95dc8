//! Per-offset hit counts and the rule deciding when they are conclusive.

use cache_side_channel::probe::PROBE_LINES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Candidate {
    pub value: u8,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct RoundTally {
    scores: [u32; PROBE_LINES],
}

impl Default for RoundTally {
    fn default() -> Self {
        RoundTally {
            scores: [0; PROBE_LINES],
        }
    }
}

impl RoundTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self, value: u8) {
        self.scores[value as usize] += 1;
    }

    pub fn score(&self, value: u8) -> u32 {
        self.scores[value as usize]
    }

    /// The highest and the second highest scores.
    ///
    /// Ties go to the lowest byte value, for both places.
    pub fn top_two(&self) -> (Candidate, Candidate) {
        let best = first_max(self.candidates());
        let second = first_max(self.candidates().filter(|c| c.value != best.value));
        (best, second)
    }

    fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        self.scores.iter().enumerate().map(|(v, &score)| Candidate {
            value: v as u8,
            score,
        })
    }
}

fn first_max(candidates: impl Iterator<Item = Candidate>) -> Candidate {
    candidates
        .fold(None, |best: Option<Candidate>, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
        .unwrap_or_default()
}

/// Stop once the leader has twice the runner-up's score, or exactly two hits
/// against none.
pub fn is_decisive(best: Candidate, second: Candidate) -> bool {
    best.score >= 2 * second.score || (best.score == 2 && second.score == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(hits: &[(u8, u32)]) -> RoundTally {
        let mut t = RoundTally::new();
        for &(v, n) in hits {
            for _ in 0..n {
                t.record_hit(v);
            }
        }
        t
    }

    fn c(value: u8, score: u32) -> Candidate {
        Candidate { value, score }
    }

    #[test]
    fn tie_goes_to_lowest_value() {
        let (best, second) = tally(&[(9, 3), (5, 3)]).top_two();
        assert_eq!(best, c(5, 3));
        assert_eq!(second, c(9, 3));
        assert!(!is_decisive(best, second));
    }

    #[test]
    fn runner_up_ties_go_to_lowest_value() {
        let (best, second) = tally(&[(200, 4), (17, 1), (3, 1)]).top_two();
        assert_eq!(best, c(200, 4));
        assert_eq!(second, c(3, 1));
    }

    #[test]
    fn empty_tally() {
        let (best, second) = RoundTally::new().top_two();
        assert_eq!(best, c(0, 0));
        assert_eq!(second, c(1, 0));
        // Zero against zero already satisfies the doubling test.
        assert!(is_decisive(best, second));
    }

    #[test]
    fn single_candidate_stops() {
        let (best, second) = tally(&[(3, 7)]).top_two();
        assert_eq!(best, c(3, 7));
        assert_eq!(second.score, 0);
        assert!(is_decisive(best, second));
    }

    #[test]
    fn doubling_rule() {
        assert!(is_decisive(c(1, 4), c(2, 2)));
        assert!(!is_decisive(c(1, 3), c(2, 2)));
        assert!(is_decisive(c(1, 2), c(2, 0)));
        assert!(is_decisive(c(1, 1), c(2, 0)));
    }

    #[test]
    fn hits_accumulate() {
        let t = tally(&[(42, 5), (7, 1)]);
        assert_eq!(t.score(42), 5);
        assert_eq!(t.score(7), 1);
        assert_eq!(t.score(8), 0);
    }
}
