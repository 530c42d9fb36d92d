//! Epoch averaging: element-wise mean novelty curves over repeated runs.
//!
//! Every epoch builds a fresh engine (and therefore fresh pool state) from
//! a factory, so epochs share nothing mutable and can fan out with rayon.
//! Durable backends should prefer the sequential variant so they never see
//! concurrent writers against the same store.

use rayon::prelude::*;

use crate::engine::{SimulationEngine, SimulationResult};
use crate::error::UrnError;
use crate::pool::WeightedPool;

/// Element-wise mean of the two novelty curves across epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedCurves {
    pub element_counts: Vec<f64>,
    pub pair_counts: Vec<f64>,
}

fn mean_curves(results: &[SimulationResult]) -> Result<AveragedCurves, UrnError> {
    let first = results
        .first()
        .ok_or_else(|| UrnError::Config("epochs must be at least 1".into()))?;
    let rounds = first.element_counts.len();
    let mut element_counts = vec![0.0f64; rounds];
    let mut pair_counts = vec![0.0f64; rounds];
    for result in results {
        if result.element_counts.len() != rounds || result.pair_counts.len() != rounds {
            return Err(UrnError::Invariant(
                "epoch produced curves of mismatched length".into(),
            ));
        }
        for i in 0..rounds {
            element_counts[i] += result.element_counts[i] as f64;
            pair_counts[i] += result.pair_counts[i] as f64;
        }
    }
    let n = results.len() as f64;
    for i in 0..rounds {
        element_counts[i] /= n;
        pair_counts[i] /= n;
    }
    Ok(AveragedCurves {
        element_counts,
        pair_counts,
    })
}

/// Run `epochs` independent epochs one after another and average the curves.
///
/// The factory receives the epoch index and must return a freshly
/// configured engine; reseeding with `seed + epoch` is the usual choice.
pub fn average_epochs<P, F>(epochs: usize, mut factory: F) -> Result<AveragedCurves, UrnError>
where
    P: WeightedPool,
    F: FnMut(usize) -> Result<SimulationEngine<P>, UrnError>,
{
    if epochs == 0 {
        return Err(UrnError::Config("epochs must be at least 1".into()));
    }
    let mut results = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let mut engine = factory(epoch)?;
        results.push(engine.run()?);
    }
    mean_curves(&results)
}

/// Like [`average_epochs`] but fanning epochs out across the rayon pool.
///
/// Only safe for backends without shared external state; the in-memory
/// backend qualifies, durable ones generally do not.
pub fn average_epochs_parallel<P, F>(epochs: usize, factory: F) -> Result<AveragedCurves, UrnError>
where
    P: WeightedPool + Send,
    F: Fn(usize) -> Result<SimulationEngine<P>, UrnError> + Sync,
{
    if epochs == 0 {
        return Err(UrnError::Config("epochs must be at least 1".into()));
    }
    let results: Result<Vec<SimulationResult>, UrnError> = (0..epochs)
        .into_par_iter()
        .map(|epoch| factory(epoch)?.run())
        .collect();
    mean_curves(&results?)
}
