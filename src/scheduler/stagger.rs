// src/scheduler/stagger.rs
//! Spreads sub-target visits across the sub-cycles of a parent interval.
//!
//! With N sub-targets and C sub-cycles per epoch, each sub-cycle plans
//! `ceil(remaining_uncovered / remaining_sub_cycles)` targets in random
//! order, so a truncated cycle doesn't always starve the same tail.
//! Coverage is recorded only on successful visits; targets missed in one
//! epoch are planned first in the next.

use std::collections::HashSet;

use rand::seq::SliceRandom;

/// Which sub-targets were already visited in the current parent interval.
#[derive(Debug, Default)]
pub struct EpochCoverage {
    pub epoch: u64,
    pub covered: HashSet<String>,
}

pub struct StaggerPlanner {
    targets: Vec<String>,
    sub_cycles_per_epoch: u32,
    sub_cycle: u32,
    coverage: EpochCoverage,
    /// Targets not covered in the previous epoch, prioritized this one.
    carryover: Vec<String>,
}

impl StaggerPlanner {
    pub fn new(targets: Vec<String>, sub_cycles_per_epoch: u32) -> Self {
        Self {
            targets,
            sub_cycles_per_epoch: sub_cycles_per_epoch.max(1),
            sub_cycle: 0,
            coverage: EpochCoverage::default(),
            carryover: Vec::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.coverage.epoch
    }

    pub fn covered(&self) -> &HashSet<String> {
        &self.coverage.covered
    }

    /// Record a successful visit for the current epoch.
    pub fn mark_covered(&mut self, target: &str) {
        self.coverage.covered.insert(target.to_string());
    }

    /// Plan the targets for the next sub-cycle, rolling the epoch over when
    /// the previous one is exhausted.
    pub fn next_batch(&mut self) -> Vec<String> {
        if self.sub_cycle >= self.sub_cycles_per_epoch {
            self.carryover = self
                .targets
                .iter()
                .filter(|t| !self.coverage.covered.contains(*t))
                .cloned()
                .collect();
            if !self.carryover.is_empty() {
                tracing::info!(
                    epoch = self.coverage.epoch,
                    missed = self.carryover.len(),
                    "epoch ended with unvisited sub-targets, prioritizing them next"
                );
            }
            self.coverage.covered.clear();
            self.coverage.epoch += 1;
            self.sub_cycle = 0;
        }

        let uncovered: Vec<String> = self
            .targets
            .iter()
            .filter(|t| !self.coverage.covered.contains(*t))
            .cloned()
            .collect();

        let remaining_cycles = (self.sub_cycles_per_epoch - self.sub_cycle) as usize;
        self.sub_cycle += 1;

        if uncovered.is_empty() {
            return Vec::new();
        }
        let take = uncovered.len().div_ceil(remaining_cycles);

        // Carryover from the last epoch goes first, the rest is shuffled.
        let prioritized: Vec<String> = self
            .carryover
            .iter()
            .filter(|t| uncovered.contains(t))
            .cloned()
            .collect();
        let mut rest: Vec<String> = uncovered
            .into_iter()
            .filter(|t| !prioritized.contains(t))
            .collect();
        rest.shuffle(&mut rand::rng());

        let mut batch = prioritized;
        batch.extend(rest);
        batch.truncate(take);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    #[test]
    fn full_coverage_exactly_once_per_epoch() {
        let mut planner = StaggerPlanner::new(targets(10), 4);
        let mut visited = Vec::new();
        for _ in 0..4 {
            let batch = planner.next_batch();
            for t in &batch {
                planner.mark_covered(t);
            }
            visited.extend(batch);
        }
        visited.sort();
        let mut expected = targets(10);
        expected.sort();
        assert_eq!(visited, expected);
        assert_eq!(planner.covered().len(), 10);
    }

    #[test]
    fn batch_sizes_stay_balanced() {
        let mut planner = StaggerPlanner::new(targets(10), 4);
        // ceil(10/4)=3, ceil(7/3)=3, ceil(4/2)=2, ceil(2/1)=2
        let sizes: Vec<usize> = (0..4)
            .map(|_| {
                let b = planner.next_batch();
                for t in &b {
                    planner.mark_covered(t);
                }
                b.len()
            })
            .collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
    }

    #[test]
    fn epoch_rollover_clears_coverage() {
        let mut planner = StaggerPlanner::new(targets(4), 2);
        for _ in 0..2 {
            for t in planner.next_batch() {
                planner.mark_covered(t.as_str());
            }
        }
        assert_eq!(planner.covered().len(), 4);
        assert_eq!(planner.epoch(), 0);

        // next call begins the next parent interval
        let batch = planner.next_batch();
        assert_eq!(planner.epoch(), 1);
        assert_eq!(planner.covered().len(), 0);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn failed_targets_are_prioritized_next_epoch() {
        let mut planner = StaggerPlanner::new(targets(4), 2);
        for _ in 0..2 {
            for t in planner.next_batch() {
                // t3 keeps failing, never marked covered
                if t != "t3" {
                    planner.mark_covered(t.as_str());
                }
            }
        }
        let first_of_next_epoch = planner.next_batch();
        assert_eq!(first_of_next_epoch.first().map(String::as_str), Some("t3"));
    }

    #[test]
    fn covered_targets_yield_empty_batches() {
        let mut planner = StaggerPlanner::new(targets(2), 4);
        for t in targets(2) {
            planner.mark_covered(&t);
        }
        assert!(planner.next_batch().is_empty());
        assert!(planner.next_batch().is_empty());
    }
}
