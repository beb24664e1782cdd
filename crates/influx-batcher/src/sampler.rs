// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cycle-level downsampling.

use crate::config::validate_sample_probability;
use crate::error::ConfigError;

/// Admits or vetoes a whole write cycle.
///
/// One draw is taken per cycle, not per measurement: a veto discards every
/// slice the cycle would have submitted.
#[derive(Debug)]
pub struct Sampler {
    probability: f64,
    rng: fastrand::Rng,
}

impl Sampler {
    #[cfg(test)]
    fn new(probability: f64) -> Result<Self, ConfigError> {
        validate_sample_probability(probability)?;
        Ok(Self {
            probability,
            rng: fastrand::Rng::new(),
        })
    }

    #[cfg(test)]
    fn with_seed(probability: f64, seed: u64) -> Result<Self, ConfigError> {
        validate_sample_probability(probability)?;
        Ok(Self {
            probability,
            rng: fastrand::Rng::with_seed(seed),
        })
    }

    #[cfg(test)]
    fn probability(&self) -> f64 {
        self.probability
    }

    pub fn set_probability(&mut self, probability: f64) -> Result<(), ConfigError> {
        validate_sample_probability(probability)?;
        self.probability = probability;
        Ok(())
    }

    /// Decide whether the current cycle proceeds.
    ///
    /// Probability 1.0 never consults the generator.
    pub fn admit(&mut self) -> bool {
        if self.probability >= 1.0 {
            return true;
        }
        self.rng.f64() < self.probability
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            probability: 1.0,
            rng: fastrand::Rng::new(),
        }
    }
}
