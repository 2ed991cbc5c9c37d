// src/state/weights.rs

//! Non-uniform step weighting.
//!
//! Weights are declared per step and must sum to exactly 100. They are
//! stored as a cumulative boundary table: weights `[20, 30, 50]` become
//! boundaries `[20, 50, 100]`, so completing step `k` puts the node at
//! boundary `k`. All arithmetic is truncating integer division.

use crate::error::{Error, Result};

/// Cumulative boundary table for weighted steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepWeights {
    boundaries: Vec<u32>,
}

impl StepWeights {
    /// Build the boundary table, validating the weights sum to exactly 100.
    pub(crate) fn new(weights: &[u32]) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidState("weighted steps cannot be empty".to_string()));
        }
        let total: u32 = weights.iter().sum();
        if total != 100 {
            return Err(Error::InvalidState(format!(
                "step weights must sum to 100, got {total}"
            )));
        }
        let mut boundaries = Vec::with_capacity(weights.len());
        let mut acc = 0;
        for weight in weights {
            acc += weight;
            boundaries.push(acc);
        }
        Ok(Self { boundaries })
    }

    pub(crate) fn len(&self) -> u32 {
        self.boundaries.len() as u32
    }

    /// Percentage after `completed` steps are done.
    pub(crate) fn completed_percent(&self, completed: u32) -> u32 {
        if completed == 0 {
            return 0;
        }
        let index = (completed as usize - 1).min(self.boundaries.len() - 1);
        self.boundaries[index]
    }

    /// Interpolate the parent percentage while the child works on step
    /// `active`: a bilinear blend between the boundaries straddling it,
    /// with an implicit boundary of 0 before the first step.
    pub(crate) fn interpolate(&self, active: u32, child_percent: u32) -> u32 {
        let active = (active as usize).min(self.boundaries.len() - 1);
        let upper = self.boundaries[active];
        if active == 0 {
            return child_percent * upper / 100;
        }
        let lower = self.boundaries[active - 1];
        ((100 - child_percent) * lower + child_percent * upper) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sums() {
        assert!(StepWeights::new(&[]).is_err());
        assert!(StepWeights::new(&[20, 30]).is_err());
        assert!(StepWeights::new(&[60, 60]).is_err());
        assert!(StepWeights::new(&[20, 30, 50]).is_ok());
    }

    #[test]
    fn test_cumulative_boundaries() {
        let weights = StepWeights::new(&[20, 30, 50]).unwrap();
        assert_eq!(weights.len(), 3);
        assert_eq!(weights.completed_percent(0), 0);
        assert_eq!(weights.completed_percent(1), 20);
        assert_eq!(weights.completed_percent(2), 50);
        assert_eq!(weights.completed_percent(3), 100);
    }

    #[test]
    fn test_interpolation_first_step() {
        let weights = StepWeights::new(&[20, 30, 50]).unwrap();
        assert_eq!(weights.interpolate(0, 0), 0);
        assert_eq!(weights.interpolate(0, 50), 10);
        assert_eq!(weights.interpolate(0, 100), 20);
    }

    #[test]
    fn test_interpolation_between_boundaries() {
        let weights = StepWeights::new(&[20, 30, 50]).unwrap();
        // Active step 1 blends between 20 and 50.
        assert_eq!(weights.interpolate(1, 0), 20);
        assert_eq!(weights.interpolate(1, 50), 35);
        assert_eq!(weights.interpolate(1, 100), 50);
        // Active step 2 blends between 50 and 100.
        assert_eq!(weights.interpolate(2, 50), 75);
    }

    #[test]
    fn test_interpolation_truncates() {
        let weights = StepWeights::new(&[33, 33, 34]).unwrap();
        // (100-1)*0 + 1*33 = 33; / 100 truncates to 0.
        assert_eq!(weights.interpolate(0, 1), 0);
        // (100-1)*33 + 1*66 = 3333; / 100 truncates to 33.
        assert_eq!(weights.interpolate(1, 1), 33);
    }
}
