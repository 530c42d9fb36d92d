//! Config-driven entry points: backend selection, epoch fan-out, averaging.
//!
//! This is the boundary a thin CLI or persistence step talks to. It
//! validates the configuration, builds the requested backend, runs the
//! epochs and hands back plain numeric curves. In-memory epochs fan out in
//! parallel; durable backends run their epochs sequentially so a single
//! table/namespace never sees concurrent writers.

use std::time::Duration;

use crate::config::{BackendKind, SimulationConfig};
use crate::engine::average::{average_epochs, average_epochs_parallel, AveragedCurves};
use crate::engine::{EngineParams, EnginePhase, SimulationEngine, SimulationResult};
use crate::error::UrnError;
use crate::logging::{JsonlLogger, LogEvent};
use crate::pool::memory::MemoryPool;
use crate::pool::relational::RelationalPool;
use crate::pool::remote::RemotePool;
use crate::pool::retry::RetryPolicy;
use crate::pool::{ElementAllocator, PoolSet, WeightedPool};
use crate::sizer::RoundSizer;

/// Run the configured simulation across its epochs and average the curves.
pub fn run_with_config(config: &SimulationConfig) -> Result<AveragedCurves, UrnError> {
    config.validate()?;
    let logger = build_logger(config)?;
    match config.backend {
        BackendKind::InMemory => {
            average_epochs_parallel(config.epochs, |epoch| memory_engine(config, &logger, epoch))
        }
        BackendKind::Relational => {
            average_epochs(config.epochs, |epoch| relational_engine(config, &logger, epoch))
        }
        BackendKind::RemoteKv => {
            average_epochs(config.epochs, |epoch| remote_engine(config, &logger, epoch))
        }
    }
}

/// Run a single epoch and return its full result, including pool contents
/// when `keep_pool_contents` is set. Averaging drops contents, so this is
/// the path for pool inspection.
pub fn run_once(config: &SimulationConfig) -> Result<SimulationResult, UrnError> {
    config.validate()?;
    let logger = build_logger(config)?;
    match config.backend {
        BackendKind::InMemory => memory_engine(config, &logger, 0)?.run(),
        BackendKind::Relational => relational_engine(config, &logger, 0)?.run(),
        BackendKind::RemoteKv => remote_engine(config, &logger, 0)?.run(),
    }
}

fn build_logger(config: &SimulationConfig) -> Result<JsonlLogger, UrnError> {
    match &config.log_path {
        Some(path) => JsonlLogger::to_file(path),
        None => Ok(JsonlLogger::disabled()),
    }
}

fn engine_params(config: &SimulationConfig, epoch: usize) -> EngineParams {
    EngineParams {
        rounds: config.rounds,
        new_element_increment: config.new_element_increment,
        new_opportunity_increment: config.new_opportunity_increment,
        seed: config.seed + epoch as u64,
        keep_pool_contents: config.keep_pool_contents,
    }
}

fn assemble<P: WeightedPool>(
    config: &SimulationConfig,
    logger: &JsonlLogger,
    epoch: usize,
    pools: Vec<P>,
) -> Result<SimulationEngine<P>, UrnError> {
    let base_total = config.base_pool_count as u64 * config.base_pool_size;
    let set = PoolSet::new(
        pools,
        config.swap_probability,
        ElementAllocator::starting_at(base_total),
    )?;
    let sizer = RoundSizer::from_options(config.card_sizes.clone(), config.poisson_mean, config.rounds)?;
    Ok(SimulationEngine::new(set, sizer, engine_params(config, epoch)).with_logger(logger.clone()))
}

fn memory_engine(
    config: &SimulationConfig,
    logger: &JsonlLogger,
    epoch: usize,
) -> Result<SimulationEngine<MemoryPool>, UrnError> {
    let pools = (0..config.base_pool_count)
        .map(|i| MemoryPool::with_base(i as u64 * config.base_pool_size, config.base_pool_size))
        .collect();
    assemble(config, logger, epoch, pools)
}

fn relational_engine(
    config: &SimulationConfig,
    logger: &JsonlLogger,
    epoch: usize,
) -> Result<SimulationEngine<RelationalPool>, UrnError> {
    let path = config
        .database_path
        .as_deref()
        .ok_or_else(|| UrnError::Config("relational backend requires database_path".into()))?;
    logger.log(&LogEvent::Phase {
        phase: EnginePhase::InitializingPool.as_str(),
    });
    let mut pools = Vec::with_capacity(config.base_pool_count);
    for i in 0..config.base_pool_count {
        let table = format!("{}{}", config.namespace, i);
        pools.push(RelationalPool::open(
            path,
            &table,
            i as u64 * config.base_pool_size,
            config.base_pool_size,
            config.batch_size,
            config.cleanup,
        )?);
    }
    assemble(config, logger, epoch, pools)
}

fn remote_engine(
    config: &SimulationConfig,
    logger: &JsonlLogger,
    epoch: usize,
) -> Result<SimulationEngine<RemotePool>, UrnError> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| UrnError::Config("remote-kv backend requires redis_url".into()))?;
    let retry = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_secs(config.retry_delay_secs),
    );
    logger.log(&LogEvent::Phase {
        phase: EnginePhase::InitializingPool.as_str(),
    });
    let mut pools = Vec::with_capacity(config.base_pool_count);
    for i in 0..config.base_pool_count {
        let prefix = format!("{}{}", config.namespace, i);
        pools.push(RemotePool::connect(
            url,
            &prefix,
            i as u64 * config.base_pool_size,
            config.base_pool_size,
            config.batch_size,
            config.cleanup,
            retry.clone(),
            logger.clone(),
        )?);
    }
    assemble(config, logger, epoch, pools)
}
