//! Round sizing: how many draws each round performs.
//!
//! Exactly one of the two modes is configured: an explicit per-round list
//! (validated up front to cover every requested round) or a Poisson
//! distribution redrawn each round. Ambiguous or missing sizing is rejected
//! before any pool or backend is touched.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};

use crate::error::UrnError;

/// Per-round draw-count source.
#[derive(Debug, Clone)]
pub enum RoundSizer {
    /// Explicit sizes, indexed by round.
    Fixed(Vec<usize>),
    /// Poisson-distributed size, redrawn every round.
    Poisson(Poisson<f64>),
}

impl RoundSizer {
    /// Build a sizer from the two optional configuration knobs.
    ///
    /// Fails fast when both or neither are supplied, when an explicit list
    /// is shorter than `rounds`, or when the Poisson mean is not positive.
    pub fn from_options(
        card_sizes: Option<Vec<usize>>,
        poisson_mean: Option<f64>,
        rounds: usize,
    ) -> Result<Self, UrnError> {
        match (card_sizes, poisson_mean) {
            (Some(_), Some(_)) | (None, None) => Err(UrnError::Config(
                "exactly one of card_sizes and poisson_mean must be supplied".into(),
            )),
            (Some(sizes), None) => {
                if sizes.len() < rounds {
                    return Err(UrnError::Config(format!(
                        "card_sizes has {} entries but {} rounds were requested",
                        sizes.len(),
                        rounds
                    )));
                }
                Ok(RoundSizer::Fixed(sizes))
            }
            (None, Some(mean)) => {
                if !(mean > 0.0) {
                    return Err(UrnError::Config(format!(
                        "poisson_mean must be positive, got {}",
                        mean
                    )));
                }
                let dist = Poisson::new(mean).map_err(|err| {
                    UrnError::Config(format!("invalid poisson_mean {}: {}", mean, err))
                })?;
                Ok(RoundSizer::Poisson(dist))
            }
        }
    }

    /// Number of draws for round `round_index`.
    pub fn next_round_size(&mut self, round_index: usize, rng: &mut StdRng) -> usize {
        match self {
            RoundSizer::Fixed(sizes) => sizes[round_index],
            RoundSizer::Poisson(dist) => dist.sample(rng) as usize,
        }
    }
}
