//! Relational pool backend over SQLite.
//!
//! Weight is stored physically: one row per unit of weight, with a dense
//! integer key and the element it belongs to. A draw picks a uniform key in
//! `[1, pool_size]` and reads that row's element. Inserts are buffered in
//! memory and flushed in a single transaction whenever the buffer reaches
//! `batch_size`; draws that land on a buffered key are answered from the
//! buffer, so reinforcement is visible before the next draw even when the
//! rows have not hit the database yet. The table is dropped and recreated at
//! setup and dropped again at teardown unless cleanup is disabled.

use rand::rngs::StdRng;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::UrnError;
use crate::pool::{Element, WeightedPool};

/// Weighted pool backed by a SQLite table.
pub struct RelationalPool {
    conn: Connection,
    table: String,
    /// Total weight, including rows still in the pending buffer.
    pool_size: u64,
    /// Keys `1..=flushed` are in the table.
    flushed: u64,
    /// Balls for keys `flushed+1..=pool_size`, in key order.
    pending: Vec<Element>,
    batch_size: usize,
    cleanup: bool,
}

impl RelationalPool {
    /// Open (or create) the database at `path` and set up a fresh pool table
    /// seeded with `base_count` elements starting at `base_first`.
    pub fn open(
        path: &std::path::Path,
        table: &str,
        base_first: Element,
        base_count: u64,
        batch_size: usize,
        cleanup: bool,
    ) -> Result<Self, UrnError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table, base_first, base_count, batch_size, cleanup)
    }

    /// Same as [`RelationalPool::open`] over an existing connection; used by
    /// tests to run against an in-memory database.
    pub fn with_connection(
        conn: Connection,
        table: &str,
        base_first: Element,
        base_count: u64,
        batch_size: usize,
        cleanup: bool,
    ) -> Result<Self, UrnError> {
        validate_table_name(table)?;
        if batch_size == 0 {
            return Err(UrnError::Config("batch_size must be at least 1".into()));
        }
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 key INTEGER PRIMARY KEY,
                 ball INTEGER NOT NULL
             );",
        ))?;
        let mut pool = Self {
            conn,
            table: table.to_string(),
            pool_size: 0,
            flushed: 0,
            pending: Vec::new(),
            batch_size,
            cleanup,
        };
        for element in base_first..base_first + base_count {
            pool.pending.push(element);
            pool.pool_size += 1;
            pool.flush_if_due()?;
        }
        pool.flush()?;
        Ok(pool)
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows currently buffered but not yet committed.
    pub fn pending_rows(&self) -> usize {
        self.pending.len()
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
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (key, ball) VALUES (?1, ?2)",
                self.table
            ))?;
            for (offset, &ball) in self.pending.iter().enumerate() {
                let key = self.flushed + 1 + offset as u64;
                stmt.execute(params![key as i64, ball as i64])?;
            }
        }
        tx.commit()?;
        self.flushed += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    fn ball_at(&self, key: u64) -> Result<Element, UrnError> {
        if key > self.flushed {
            let offset = (key - self.flushed - 1) as usize;
            return self.pending.get(offset).copied().ok_or_else(|| {
                UrnError::Invariant(format!("buffered key {} out of range", key))
            });
        }
        let ball: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT ball FROM {} WHERE key = ?1", self.table),
                params![key as i64],
                |row| row.get(0),
            )
            .optional()?;
        match ball {
            Some(ball) => Ok(ball as Element),
            None => Err(UrnError::Invariant(format!(
                "missing row for key {} in table {}",
                key, self.table
            ))),
        }
    }
}

impl WeightedPool for RelationalPool {
    fn draw(&mut self, rng: &mut StdRng) -> Result<Element, UrnError> {
        if self.pool_size == 0 {
            return Err(UrnError::EmptyPool);
        }
        let key = rng.gen_range(0..self.pool_size) + 1;
        self.ball_at(key)
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
        let mut stmt = self.conn.prepare(&format!(
            "SELECT ball, COUNT(*) FROM {} GROUP BY ball ORDER BY ball",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as Element, row.get::<_, i64>(1)? as u64))
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    fn finish(&mut self) -> Result<(), UrnError> {
        self.flush()?;
        if self.cleanup {
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", self.table))?;
        }
        Ok(())
    }
}

fn validate_table_name(table: &str) -> Result<(), UrnError> {
    let ok = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.chars().next().unwrap_or('0').is_ascii_digit();
    if ok {
        Ok(())
    } else {
        Err(UrnError::Config(format!(
            "invalid table name '{}': use letters, digits and underscores",
            table
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory::MemoryPool;
    use rand::SeedableRng;

    fn test_pool(base_count: u64, batch_size: usize) -> RelationalPool {
        let conn = Connection::open_in_memory().unwrap();
        RelationalPool::with_connection(conn, "urnsim0", 0, base_count, batch_size, true).unwrap()
    }

    #[test]
    fn rejects_hostile_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        let err = RelationalPool::with_connection(conn, "urnsim0; DROP", 0, 1, 1, true);
        assert!(matches!(err, Err(UrnError::Config(_))));
    }

    #[test]
    fn base_fill_is_queryable() {
        let mut pool = test_pool(4, 1);
        assert_eq!(pool.total_weight(), 4);
        assert_eq!(
            pool.contents().unwrap(),
            vec![(0, 1), (1, 1), (2, 1), (3, 1)]
        );
    }

    #[test]
    fn draw_from_empty_pool_is_fatal() {
        let mut pool = test_pool(0, 1);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(pool.draw(&mut rng), Err(UrnError::EmptyPool)));
    }

    #[test]
    fn buffered_rows_are_visible_to_draws_before_flush() {
        // batch_size large enough that nothing flushes during the test body.
        let mut pool = test_pool(1, 1000);
        pool.reinforce(0, 5).unwrap();
        pool.inject(&[1]).unwrap();
        assert!(pool.pending_rows() > 0);
        assert_eq!(pool.total_weight(), 7);
        // Key 7 is the injected element, still unflushed.
        assert_eq!(pool.ball_at(7).unwrap(), 1);
        assert_eq!(pool.ball_at(3).unwrap(), 0);
    }

    #[test]
    fn flush_happens_at_batch_threshold() {
        let mut pool = test_pool(1, 4);
        pool.reinforce(0, 2).unwrap();
        assert_eq!(pool.pending_rows(), 2);
        pool.reinforce(0, 2).unwrap();
        assert_eq!(pool.pending_rows(), 0);
        assert_eq!(pool.contents().unwrap(), vec![(0, 5)]);
    }

    #[test]
    fn cleanup_drops_the_table() {
        let conn = Connection::open_in_memory().unwrap();
        let mut pool =
            RelationalPool::with_connection(conn, "urnsim0", 0, 2, 1, true).unwrap();
        pool.finish().unwrap();
        let count: i64 = pool
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'urnsim0'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn disabled_cleanup_leaves_the_table_for_inspection() {
        let conn = Connection::open_in_memory().unwrap();
        let mut pool =
            RelationalPool::with_connection(conn, "urnsim0", 0, 2, 1, false).unwrap();
        pool.finish().unwrap();
        let count: i64 = pool
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'urnsim0'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn setup_wipes_leftover_state_from_a_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urn.db");
        {
            // cleanup disabled, so 50 rows stay behind on disk.
            let mut leftover = RelationalPool::open(&path, "urnsim0", 0, 50, 1, false).unwrap();
            leftover.finish().unwrap();
        }
        // A fresh pool over the same database must not see the 50 old rows.
        let mut pool = RelationalPool::open(&path, "urnsim0", 0, 3, 1, true).unwrap();
        assert_eq!(pool.total_weight(), 3);
        assert_eq!(pool.contents().unwrap().len(), 3);
    }

    #[test]
    fn draw_sequence_matches_memory_backend_bit_for_bit() {
        let mut sql_pool = test_pool(5, 3);
        let mut mem_pool = MemoryPool::with_base(0, 5);
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let mut next_id = 5u64;
        for _ in 0..200 {
            let a = sql_pool.draw(&mut rng_a).unwrap();
            let b = mem_pool.draw(&mut rng_b).unwrap();
            assert_eq!(a, b);
            sql_pool.reinforce(a, 2).unwrap();
            mem_pool.reinforce(b, 2).unwrap();
            if a % 3 == 0 {
                sql_pool.inject(&[next_id]).unwrap();
                mem_pool.inject(&[next_id]).unwrap();
                next_id += 1;
            }
        }
        assert_eq!(sql_pool.total_weight(), mem_pool.total_weight());
        assert_eq!(sql_pool.contents().unwrap(), mem_pool.contents().unwrap());
    }
}
