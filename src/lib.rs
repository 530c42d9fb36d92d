//! # Novelty Urn
//!
//! A reinforced urn simulation engine for studying how adoption of discrete
//! items (library imports, classification codes, title words) spreads over
//! time. Rounds of weighted draws reinforce what was drawn and, on an
//! element's first-ever draw, inject brand-new elements into the pool (the
//! "adjacent possible"). The output is a pair of novelty curves: cumulative
//! distinct elements and cumulative distinct co-occurring pairs per round.
//!
//! One pool contract, three storage substrates with identical statistical
//! semantics: in-memory, SQLite-backed, and Redis-backed (the latter behind
//! a bounded busy-loading retry policy). A seeded run produces bit-identical
//! curves on every substrate.
//!
//! ## Quick Start
//!
//! ```
//! use novelty_urn::{run_with_config, SimulationConfig};
//!
//! let config = SimulationConfig {
//!     rounds: 50,
//!     base_pool_size: 10,
//!     new_element_increment: 4,
//!     new_opportunity_increment: 4,
//!     epochs: 2,
//!     poisson_mean: Some(3.0),
//!     ..SimulationConfig::default()
//! };
//!
//! let curves = run_with_config(&config).unwrap();
//! assert_eq!(curves.element_counts.len(), 50);
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Run configuration via TOML, validated fail-fast
//! - [`pool`] - The weighted pool contract and its three backends
//! - [`sizer`] - Per-round draw counts (explicit list or Poisson)
//! - [`novelty`] - Distinct-element and distinct-pair accounting
//! - [`engine`] - The round loop, engine phases, epoch averaging
//! - [`logging`] - JSON line-delimited run logging

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod novelty;
pub mod pool;
pub mod runner;
pub mod sizer;

pub use config::{BackendKind, SimulationConfig};
pub use engine::average::{average_epochs, average_epochs_parallel, AveragedCurves};
pub use engine::{EngineParams, EnginePhase, SimulationEngine, SimulationResult};
pub use error::UrnError;
pub use logging::{JsonlLogger, LogEvent};
pub use novelty::NoveltyTracker;
pub use pool::memory::MemoryPool;
pub use pool::relational::RelationalPool;
pub use pool::remote::RemotePool;
pub use pool::retry::RetryPolicy;
pub use pool::{Element, ElementAllocator, PoolSet, WeightedPool};
pub use runner::{run_once, run_with_config};
pub use sizer::RoundSizer;
