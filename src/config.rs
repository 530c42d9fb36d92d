//! Simulation configuration via TOML files.
//!
//! This module provides configuration parsing from TOML format with
//! sensible defaults, plus the fail-fast validation that runs before any
//! pool or backend is touched.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use toml::Value;

use crate::error::UrnError;
use crate::sizer::RoundSizer;

/// Selectable pool storage substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    InMemory,
    Relational,
    RemoteKv,
}

impl FromStr for BackendKind {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-memory" => Ok(BackendKind::InMemory),
            "relational" => Ok(BackendKind::Relational),
            "remote-kv" => Ok(BackendKind::RemoteKv),
            other => Err(UrnError::Config(format!(
                "unknown backend '{}': expected in-memory, relational or remote-kv",
                other
            ))),
        }
    }
}

/// Full configuration of a simulation run.
///
/// # Examples
///
/// ```
/// use novelty_urn::SimulationConfig;
///
/// let config = SimulationConfig::from_str_toml(
///     "[simulation]\nrounds = 50\nbase_pool_size = 10",
/// ).unwrap();
/// assert_eq!(config.rounds, 50);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SimulationConfig {
    /// Number of rounds per epoch.
    pub rounds: usize,
    /// Elements per base pool, weight 1 each.
    pub base_pool_size: u64,
    /// Number of independent pools (1 disables the swap rule).
    pub base_pool_count: usize,
    /// Weight added to a drawn element.
    pub new_element_increment: u64,
    /// Fresh elements injected on an element's first draw.
    pub new_opportunity_increment: u64,
    /// Per-draw probability of switching to a different pool.
    pub swap_probability: f64,
    /// Independent runs to average over.
    pub epochs: usize,
    /// Base RNG seed; epoch `e` reseeds with `seed + e`.
    pub seed: u64,
    /// Explicit per-round draw counts. Mutually exclusive with
    /// `poisson_mean`.
    pub card_sizes: Option<Vec<usize>>,
    /// Poisson mean for per-round draw counts. Mutually exclusive with
    /// `card_sizes`.
    pub poisson_mean: Option<f64>,
    /// Capture final pool contents in single-epoch results.
    pub keep_pool_contents: bool,
    pub backend: BackendKind,
    /// Rows buffered per transaction/pipeline on durable backends.
    pub batch_size: usize,
    /// Wipe durable state at teardown; disable to inspect it afterwards.
    pub cleanup: bool,
    /// SQLite file, required by the relational backend.
    pub database_path: Option<PathBuf>,
    /// Redis URL, required by the remote-kv backend.
    pub redis_url: Option<String>,
    /// Table/key-prefix namespace on durable backends.
    pub namespace: String,
    /// Attempt cap for transient remote failures.
    pub retry_attempts: u32,
    /// Fixed wait between retry attempts, in seconds.
    pub retry_delay_secs: u64,
    /// JSONL log destination; logging is off when absent.
    pub log_path: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            base_pool_size: 100,
            base_pool_count: 1,
            new_element_increment: 1,
            new_opportunity_increment: 1,
            swap_probability: 0.0,
            epochs: 1,
            seed: 42,
            card_sizes: None,
            poisson_mean: Some(3.0),
            keep_pool_contents: false,
            backend: BackendKind::InMemory,
            batch_size: 1,
            cleanup: true,
            database_path: None,
            redis_url: None,
            namespace: "urnsim".to_string(),
            retry_attempts: 10,
            retry_delay_secs: 5,
            log_path: None,
        }
    }
}

impl SimulationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, UrnError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str_toml(&contents)
    }

    pub fn from_str_toml(toml_str: &str) -> Result<Self, UrnError> {
        let value: Value = toml::from_str(toml_str)
            .map_err(|err| UrnError::Config(format!("TOML parse error: {}", err)))?;
        let mut config = Self::default();

        if let Some(sim) = value.get("simulation").and_then(|v| v.as_table()) {
            if let Some(v) = get_integer(sim, "rounds")? {
                config.rounds = v as usize;
            }
            if let Some(v) = get_integer(sim, "base_pool_size")? {
                config.base_pool_size = v as u64;
            }
            if let Some(v) = get_integer(sim, "base_pool_count")? {
                config.base_pool_count = v as usize;
            }
            if let Some(v) = get_integer(sim, "new_element_increment")? {
                config.new_element_increment = v as u64;
            }
            if let Some(v) = get_integer(sim, "new_opportunity_increment")? {
                config.new_opportunity_increment = v as u64;
            }
            if let Some(v) = get_float(sim, "swap_probability")? {
                config.swap_probability = v;
            }
            if let Some(v) = get_integer(sim, "epochs")? {
                config.epochs = v as usize;
            }
            if let Some(v) = get_integer(sim, "seed")? {
                config.seed = v as u64;
            }
            if let Some(v) = sim.get("keep_pool_contents").and_then(|v| v.as_bool()) {
                config.keep_pool_contents = v;
            }
        }

        if let Some(sizing) = value.get("sizing").and_then(|v| v.as_table()) {
            let card_sizes = sizing.get("card_sizes").and_then(|v| v.as_array()).map(
                |items| -> Result<Vec<usize>, UrnError> {
                    items
                        .iter()
                        .map(|item| {
                            item.as_integer().map(|v| v as usize).ok_or_else(|| {
                                UrnError::Config("card_sizes entries must be integers".into())
                            })
                        })
                        .collect()
                },
            );
            if let Some(sizes) = card_sizes {
                config.card_sizes = Some(sizes?);
                config.poisson_mean = None;
            }
            if let Some(mean) = get_float(sizing, "poisson_mean")? {
                config.poisson_mean = Some(mean);
            }
        }

        if let Some(backend) = value.get("backend").and_then(|v| v.as_table()) {
            if let Some(kind) = backend.get("kind").and_then(|v| v.as_str()) {
                config.backend = kind.parse()?;
            }
            if let Some(v) = get_integer(backend, "batch_size")? {
                config.batch_size = v as usize;
            }
            if let Some(v) = backend.get("cleanup").and_then(|v| v.as_bool()) {
                config.cleanup = v;
            }
            if let Some(path) = backend.get("database_path").and_then(|v| v.as_str()) {
                config.database_path = Some(PathBuf::from(path));
            }
            if let Some(url) = backend.get("redis_url").and_then(|v| v.as_str()) {
                config.redis_url = Some(url.to_string());
            }
            if let Some(ns) = backend.get("namespace").and_then(|v| v.as_str()) {
                config.namespace = ns.to_string();
            }
            if let Some(v) = get_integer(backend, "retry_attempts")? {
                config.retry_attempts = v as u32;
            }
            if let Some(v) = get_integer(backend, "retry_delay_secs")? {
                config.retry_delay_secs = v as u64;
            }
        }

        if let Some(logging) = value.get("logging").and_then(|v| v.as_table()) {
            if let Some(path) = logging.get("path").and_then(|v| v.as_str()) {
                config.log_path = Some(PathBuf::from(path));
            }
        }

        Ok(config)
    }

    /// Reject invalid or ambiguous configuration before any pool, file or
    /// connection is created.
    pub fn validate(&self) -> Result<(), UrnError> {
        if self.rounds == 0 {
            return Err(UrnError::Config("rounds must be at least 1".into()));
        }
        if self.base_pool_size == 0 {
            return Err(UrnError::Config("base_pool_size must be at least 1".into()));
        }
        if self.base_pool_count == 0 {
            return Err(UrnError::Config("base_pool_count must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.swap_probability) {
            return Err(UrnError::Config(format!(
                "swap_probability must be within [0, 1], got {}",
                self.swap_probability
            )));
        }
        if self.epochs == 0 {
            return Err(UrnError::Config("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(UrnError::Config("batch_size must be at least 1".into()));
        }
        if self.retry_attempts == 0 {
            return Err(UrnError::Config("retry_attempts must be at least 1".into()));
        }
        // Exercises the same checks the sizer applies at construction:
        // exactly one mode, list long enough, positive mean.
        RoundSizer::from_options(self.card_sizes.clone(), self.poisson_mean, self.rounds)?;
        match self.backend {
            BackendKind::InMemory => {}
            BackendKind::Relational => {
                if self.database_path.is_none() {
                    return Err(UrnError::Config(
                        "relational backend requires database_path".into(),
                    ));
                }
            }
            BackendKind::RemoteKv => {
                if self.redis_url.is_none() {
                    return Err(UrnError::Config(
                        "remote-kv backend requires redis_url".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn get_integer(table: &toml::map::Map<String, Value>, key: &str) -> Result<Option<i64>, UrnError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => match value.as_integer() {
            Some(v) if v >= 0 => Ok(Some(v)),
            Some(v) => Err(UrnError::Config(format!(
                "{} must be non-negative, got {}",
                key, v
            ))),
            None => Err(UrnError::Config(format!("{} must be an integer", key))),
        },
    }
}

fn get_float(table: &toml::map::Map<String, Value>, key: &str) -> Result<Option<f64>, UrnError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => match value
            .as_float()
            .or_else(|| value.as_integer().map(|v| v as f64))
        {
            Some(v) => Ok(Some(v)),
            None => Err(UrnError::Config(format!("{} must be a number", key))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_sections_missing() {
        let config = SimulationConfig::from_str_toml("").unwrap();
        assert_eq!(config.rounds, 100);
        assert_eq!(config.backend, BackendKind::InMemory);
        assert_eq!(config.poisson_mean, Some(3.0));
        config.validate().unwrap();
    }

    #[test]
    fn parses_custom_values() {
        let toml = r#"
            [simulation]
            rounds = 20
            base_pool_size = 7
            base_pool_count = 3
            new_element_increment = 4
            new_opportunity_increment = 2
            swap_probability = 0.25
            epochs = 5
            seed = 11

            [sizing]
            card_sizes = [3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3]

            [backend]
            kind = "relational"
            batch_size = 64
            cleanup = false
            database_path = "urn.db"
            namespace = "adoption"

            [logging]
            path = "run.jsonl"
        "#;
        let config = SimulationConfig::from_str_toml(toml).unwrap();
        assert_eq!(config.rounds, 20);
        assert_eq!(config.base_pool_count, 3);
        assert_eq!(config.swap_probability, 0.25);
        assert_eq!(config.backend, BackendKind::Relational);
        assert_eq!(config.batch_size, 64);
        assert!(!config.cleanup);
        assert_eq!(config.namespace, "adoption");
        assert_eq!(config.card_sizes.as_ref().unwrap().len(), 20);
        assert_eq!(config.poisson_mean, None);
        assert_eq!(config.log_path, Some(PathBuf::from("run.jsonl")));
        config.validate().unwrap();
    }

    #[test]
    fn card_sizes_replace_the_default_poisson_mean() {
        let toml = "[simulation]\nrounds = 2\n\n[sizing]\ncard_sizes = [1, 2]";
        let config = SimulationConfig::from_str_toml(toml).unwrap();
        assert_eq!(config.poisson_mean, None);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_backend_kind_is_rejected() {
        let toml = "[backend]\nkind = \"graph\"";
        assert!(matches!(
            SimulationConfig::from_str_toml(toml),
            Err(UrnError::Config(_))
        ));
    }

    #[test]
    fn ambiguous_sizing_fails_validation() {
        let mut config = SimulationConfig::default();
        config.card_sizes = Some(vec![1; 100]);
        // poisson_mean still set from defaults.
        assert!(matches!(config.validate(), Err(UrnError::Config(_))));
    }

    #[test]
    fn short_card_size_list_fails_validation() {
        let mut config = SimulationConfig::default();
        config.poisson_mean = None;
        config.card_sizes = Some(vec![1; 10]);
        assert!(matches!(config.validate(), Err(UrnError::Config(_))));
    }

    #[test]
    fn relational_backend_requires_a_database_path() {
        let mut config = SimulationConfig::default();
        config.backend = BackendKind::Relational;
        assert!(matches!(config.validate(), Err(UrnError::Config(_))));
        config.database_path = Some(PathBuf::from("urn.db"));
        config.validate().unwrap();
    }

    #[test]
    fn remote_backend_requires_a_url() {
        let mut config = SimulationConfig::default();
        config.backend = BackendKind::RemoteKv;
        assert!(matches!(config.validate(), Err(UrnError::Config(_))));
        config.redis_url = Some("redis://127.0.0.1:6379/10".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn negative_scalars_are_rejected_at_parse_time() {
        let toml = "[simulation]\nrounds = -1";
        assert!(matches!(
            SimulationConfig::from_str_toml(toml),
            Err(UrnError::Config(_))
        ));
    }
}
