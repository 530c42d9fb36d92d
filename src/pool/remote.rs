//! Remote key-value pool backend over Redis.
//!
//! Same one-row-per-unit-of-weight model as the relational backend, with
//! keys living in a prefixed namespace of an external Redis instance.
//! Writes accumulate into a command pipeline flushed per batch; draws that
//! land on an unflushed key are served from the pending buffer. Every
//! remote operation runs under a [`RetryPolicy`]: a busy-loading response
//! is waited out and retried up to the attempt cap, anything else aborts
//! the run. The namespace is wiped at setup and again at teardown unless
//! cleanup is disabled.

use rand::rngs::StdRng;
use rand::Rng;
use redis::{Connection, ErrorKind, RedisError};

use crate::error::UrnError;
use crate::logging::{JsonlLogger, LogEvent};
use crate::pool::retry::RetryPolicy;
use crate::pool::{Element, WeightedPool};

/// Chunk size for namespace scans and bulk reads.
const SCAN_CHUNK: usize = 1000;

/// True for the transient "store is still loading its dataset" error.
pub fn is_busy_loading(err: &RedisError) -> bool {
    err.kind() == ErrorKind::BusyLoadingError
}

/// Weighted pool backed by a remote Redis namespace.
pub struct RemotePool {
    conn: Connection,
    prefix: String,
    /// Total weight, including rows still in the pending buffer.
    pool_size: u64,
    /// Keys `1..=flushed` are in the store.
    flushed: u64,
    /// Balls for keys `flushed+1..=pool_size`, in key order.
    pending: Vec<Element>,
    batch_size: usize,
    cleanup: bool,
    retry: RetryPolicy,
    logger: JsonlLogger,
}

impl RemotePool {
    /// Connect to `url`, wipe the `prefix` namespace, and seed it with
    /// `base_count` elements starting at `base_first`.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        url: &str,
        prefix: &str,
        base_first: Element,
        base_count: u64,
        batch_size: usize,
        cleanup: bool,
        retry: RetryPolicy,
        logger: JsonlLogger,
    ) -> Result<Self, UrnError> {
        validate_prefix(prefix)?;
        if batch_size == 0 {
            return Err(UrnError::Config("batch_size must be at least 1".into()));
        }
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        let mut pool = Self {
            conn,
            prefix: prefix.to_string(),
            pool_size: 0,
            flushed: 0,
            pending: Vec::new(),
            batch_size,
            cleanup,
            retry,
            logger,
        };
        pool.logger.log(&LogEvent::BackendSetup {
            backend: "remote-kv",
            detail: "wiping namespace",
        });
        pool.wipe_namespace()?;
        pool.logger.log(&LogEvent::BackendSetup {
            backend: "remote-kv",
            detail: "filling base pool",
        });
        for element in base_first..base_first + base_count {
            pool.pending.push(element);
            pool.pool_size += 1;
            pool.flush_if_due()?;
        }
        pool.flush()?;
        Ok(pool)
    }

    /// Rows currently buffered but not yet sent to the store.
    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    fn key_for(&self, key: u64) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn with_retry<T>(
        &mut self,
        op: &str,
        mut attempt_fn: impl FnMut(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T, UrnError> {
        let conn = &mut self.conn;
        self.retry
            .run(op, &self.logger, is_busy_loading, || attempt_fn(conn))
    }

    fn wipe_namespace(&mut self) -> Result<(), UrnError> {
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        loop {
            let pattern = pattern.clone();
            let (next, keys): (u64, Vec<String>) = self.with_retry("scan", move |conn| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_CHUNK)
                    .query(conn)
            })?;
            if !keys.is_empty() {
                self.with_retry("del", move |conn| {
                    redis::cmd("DEL").arg(&keys).query::<u64>(conn)
                })?;
            }
            cursor = next;
            if cursor == 0 {
                return Ok(());
            }
        }
    }

    fn flush_if_due(&mut self) -> Result<(), UrnError> {
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), UrnError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (offset, &ball) in self.pending.iter().enumerate() {
            let key = self.flushed + 1 + offset as u64;
            pipe.cmd("SET").arg(self.key_for(key)).arg(ball).ignore();
        }
        self.with_retry("pipeline_exec", move |conn| pipe.query::<()>(conn))?;
        self.flushed += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

impl WeightedPool for RemotePool {
    fn draw(&mut self, rng: &mut StdRng) -> Result<Element, UrnError> {
        if self.pool_size == 0 {
            return Err(UrnError::EmptyPool);
        }
        let key = rng.gen_range(0..self.pool_size) + 1;
        if key > self.flushed {
            let offset = (key - self.flushed - 1) as usize;
            return self.pending.get(offset).copied().ok_or_else(|| {
                UrnError::Invariant(format!("buffered key {} out of range", key))
            });
        }
        let name = self.key_for(key);
        let value: Option<u64> =
            self.with_retry("get", move |conn| redis::cmd("GET").arg(&name).query(conn))?;
        match value {
            Some(ball) => Ok(ball),
            None => Err(UrnError::Invariant(format!(
                "missing key {} in namespace {}",
                key, self.prefix
            ))),
        }
    }

    fn reinforce(&mut self, element: Element, amount: u64) -> Result<(), UrnError> {
        if amount == 0 {
            return Ok(());
        }
        for _ in 0..amount {
            self.pending.push(element);
        }
        self.pool_size += amount;
        self.flush_if_due()
    }

    fn inject(&mut self, elements: &[Element]) -> Result<(), UrnError> {
        self.pending.extend_from_slice(elements);
        self.pool_size += elements.len() as u64;
        self.flush_if_due()
    }

    fn total_weight(&self) -> u64 {
        self.pool_size
    }

    fn contents(&mut self) -> Result<Vec<(Element, u64)>, UrnError> {
        self.flush()?;
        let mut weights: std::collections::HashMap<Element, u64> = std::collections::HashMap::new();
        let mut key = 1u64;
        while key <= self.flushed {
            let upper = (key + SCAN_CHUNK as u64 - 1).min(self.flushed);
            let names: Vec<String> = (key..=upper).map(|k| self.key_for(k)).collect();
            let values: Vec<Option<u64>> = self.with_retry("mget", move |conn| {
                redis::cmd("MGET").arg(&names).query(conn)
            })?;
            for (offset, value) in values.into_iter().enumerate() {
                match value {
                    Some(ball) => *weights.entry(ball).or_insert(0) += 1,
                    None => {
                        return Err(UrnError::Invariant(format!(
                            "missing key {} in namespace {}",
                            key + offset as u64,
                            self.prefix
                        )))
                    }
                }
            }
            key = upper + 1;
        }
        let mut pairs: Vec<(Element, u64)> = weights.into_iter().collect();
        pairs.sort_unstable_by_key(|&(e, _)| e);
        Ok(pairs)
    }

    fn finish(&mut self) -> Result<(), UrnError> {
        self.flush()?;
        if self.cleanup {
            self.logger.log(&LogEvent::BackendSetup {
                backend: "remote-kv",
                detail: "wiping namespace at teardown",
            });
            self.wipe_namespace()?;
        }
        Ok(())
    }
}

fn validate_prefix(prefix: &str) -> Result<(), UrnError> {
    let ok = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(UrnError::Config(format!(
            "invalid namespace prefix '{}': use letters, digits and underscores",
            prefix
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory::MemoryPool;
    use rand::SeedableRng;

    const TEST_URL: &str = "redis://127.0.0.1:6379/10";

    #[test]
    fn busy_loading_is_the_only_transient_error_kind() {
        let busy = RedisError::from((ErrorKind::BusyLoadingError, "LOADING"));
        assert!(is_busy_loading(&busy));
        let other = RedisError::from((ErrorKind::TypeError, "WRONGTYPE"));
        assert!(!is_busy_loading(&other));
    }

    #[test]
    fn hostile_prefix_is_rejected() {
        assert!(matches!(
            validate_prefix("urnsim:*"),
            Err(UrnError::Config(_))
        ));
        assert!(validate_prefix("urnsim0").is_ok());
    }

    // Needs a live Redis on 127.0.0.1:6379. Run with `cargo test -- --ignored`.
    #[test]
    #[ignore]
    fn draw_sequence_matches_memory_backend_bit_for_bit() {
        let mut remote = RemotePool::connect(
            TEST_URL,
            "urnsim_test",
            0,
            5,
            3,
            true,
            RetryPolicy::default(),
            JsonlLogger::disabled(),
        )
        .unwrap();
        let mut mem = MemoryPool::with_base(0, 5);
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let mut next_id = 5u64;
        for _ in 0..100 {
            let a = remote.draw(&mut rng_a).unwrap();
            let b = mem.draw(&mut rng_b).unwrap();
            assert_eq!(a, b);
            remote.reinforce(a, 2).unwrap();
            mem.reinforce(b, 2).unwrap();
            if a % 3 == 0 {
                remote.inject(&[next_id]).unwrap();
                mem.inject(&[next_id]).unwrap();
                next_id += 1;
            }
        }
        assert_eq!(remote.contents().unwrap(), mem.contents().unwrap());
        remote.finish().unwrap();
    }
}
