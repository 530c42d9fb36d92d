//! Simulation engine: rounds of reinforced draws over a pool set.
//!
//! Each round asks the sizer for a draw count, then for every draw: apply
//! the swap rule, draw an element, reinforce it, and expand the pool with
//! fresh elements when the drawn one had never been seen. The round's draw
//! list then feeds the novelty tracker. A run moves through
//! `Configured → Running → Done` and lands in `Failed` on any unrecovered
//! error, returning no partial curves.

pub mod average;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::UrnError;
use crate::logging::{JsonlLogger, LogEvent};
use crate::novelty::NoveltyTracker;
use crate::pool::{Element, PoolSet, WeightedPool};
use crate::sizer::RoundSizer;

/// How often the running engine emits a progress event.
const PROGRESS_EVERY: usize = 1000;

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Configured,
    InitializingPool,
    Running,
    Done,
    Failed,
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnginePhase::Configured => "configured",
            EnginePhase::InitializingPool => "initializing_pool",
            EnginePhase::Running => "running",
            EnginePhase::Done => "done",
            EnginePhase::Failed => "failed",
        }
    }
}

/// Scalar knobs of a single simulation run.
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub rounds: usize,
    /// Weight added to a drawn element, applied immediately after the draw.
    pub new_element_increment: u64,
    /// Fresh elements injected when a draw sees an element for the first time.
    pub new_opportunity_increment: u64,
    pub seed: u64,
    /// Capture per-pool `(element, weight)` snapshots in the result.
    pub keep_pool_contents: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            rounds: 100,
            new_element_increment: 1,
            new_opportunity_increment: 1,
            seed: 42,
            keep_pool_contents: false,
        }
    }
}

/// Output of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Cumulative distinct-element count after each round.
    pub element_counts: Vec<u64>,
    /// Cumulative distinct-pair count after each round.
    pub pair_counts: Vec<u64>,
    /// Per-pool final contents, when requested.
    pub pool_contents: Option<Vec<Vec<(Element, u64)>>>,
}

/// One simulation run over a pool set.
pub struct SimulationEngine<P: WeightedPool> {
    pools: PoolSet<P>,
    sizer: RoundSizer,
    tracker: NoveltyTracker,
    rng: StdRng,
    params: EngineParams,
    logger: JsonlLogger,
    phase: EnginePhase,
}

impl<P: WeightedPool> SimulationEngine<P> {
    pub fn new(pools: PoolSet<P>, sizer: RoundSizer, params: EngineParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            pools,
            sizer,
            tracker: NoveltyTracker::new(),
            rng,
            params,
            logger: JsonlLogger::disabled(),
            phase: EnginePhase::Configured,
        }
    }

    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Run every round to completion.
    ///
    /// A failed run returns the triggering error and no curves; the engine
    /// cannot be rerun either way.
    pub fn run(&mut self) -> Result<SimulationResult, UrnError> {
        if self.phase != EnginePhase::Configured {
            return Err(UrnError::Invariant(format!(
                "engine in phase '{}' cannot run again",
                self.phase.as_str()
            )));
        }
        self.set_phase(EnginePhase::Running);
        match self.run_rounds() {
            Ok(result) => {
                self.set_phase(EnginePhase::Done);
                Ok(result)
            }
            Err(err) => {
                self.set_phase(EnginePhase::Failed);
                Err(err)
            }
        }
    }

    fn set_phase(&mut self, phase: EnginePhase) {
        self.phase = phase;
        self.logger.log(&LogEvent::Phase {
            phase: phase.as_str(),
        });
    }

    fn run_rounds(&mut self) -> Result<SimulationResult, UrnError> {
        for round in 0..self.params.rounds {
            let size = self.sizer.next_round_size(round, &mut self.rng);
            let mut drawn = Vec::with_capacity(size);
            for _ in 0..size {
                let element = self.pools.draw(&mut self.rng)?;
                drawn.push(element);
                self.pools
                    .reinforce(element, self.params.new_element_increment)?;
                if self.tracker.record_element(element) {
                    self.pools.expand(self.params.new_opportunity_increment)?;
                }
            }
            self.tracker.finish_round(&drawn);
            self.check_curve_invariant(round)?;
            if (round + 1) % PROGRESS_EVERY == 0 {
                self.logger.log(&LogEvent::Progress {
                    round,
                    elements_seen: *self.tracker.element_counts().last().unwrap_or(&0),
                    pairs_seen: *self.tracker.pair_counts().last().unwrap_or(&0),
                });
            }
        }
        let pool_contents = if self.params.keep_pool_contents {
            Some(self.pools.contents()?)
        } else {
            None
        };
        self.pools.finish()?;
        Ok(SimulationResult {
            element_counts: self.tracker.element_counts().to_vec(),
            pair_counts: self.tracker.pair_counts().to_vec(),
            pool_contents,
        })
    }

    fn check_curve_invariant(&self, round: usize) -> Result<(), UrnError> {
        let elements = self.tracker.element_counts()[round];
        let pairs = self.tracker.pair_counts()[round];
        let bound = elements.saturating_mul(elements.saturating_sub(1)) / 2;
        if pairs > bound {
            return Err(UrnError::Invariant(format!(
                "round {}: {} pairs exceeds C({}, 2) = {}",
                round, pairs, elements, bound
            )));
        }
        Ok(())
    }
}
