//! Weighted element pools.
//!
//! A pool is a weighted multiset of element identifiers: drawing returns an
//! element with probability proportional to its weight, reinforcement adds
//! weight to an existing element, and injection adds brand-new weight-1
//! elements. One contract, three storage substrates:
//!
//! - [`memory::MemoryPool`] — in-process, prefix-sum index
//! - [`relational::RelationalPool`] — SQLite, one row per unit of weight
//! - [`remote::RemotePool`] — Redis, same row model behind a retry policy
//!
//! All three consume randomness identically (a single uniform draw in
//! `[0, total_weight)` per `draw` call) and lay weight out in the same
//! append order, so a seeded run produces the same novelty curves no matter
//! which substrate backs it.

pub mod memory;
pub mod relational;
pub mod remote;
pub mod retry;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::UrnError;

/// Element identifier. Allocated monotonically, never reused.
pub type Element = u64;

/// Sole source of fresh element identifiers.
///
/// Kept outside the pools so identifiers stay globally unique even when
/// several pools expand independently.
#[derive(Debug, Clone)]
pub struct ElementAllocator {
    next: Element,
}

impl ElementAllocator {
    /// Allocator whose first fresh identifier is `next`.
    pub fn starting_at(next: Element) -> Self {
        Self { next }
    }

    /// Allocate `count` consecutive fresh identifiers.
    pub fn take(&mut self, count: u64) -> Vec<Element> {
        let start = self.next;
        self.next += count;
        (start..self.next).collect()
    }

    /// Next identifier that would be handed out.
    pub fn peek(&self) -> Element {
        self.next
    }
}

/// Contract shared by every pool backend.
pub trait WeightedPool {
    /// Draw one element with probability proportional to its weight.
    ///
    /// Drawing from a pool with zero total weight is a fatal
    /// [`UrnError::EmptyPool`]; it cannot happen under a valid base-pool
    /// configuration but is checked on every call.
    fn draw(&mut self, rng: &mut StdRng) -> Result<Element, UrnError>;

    /// Increase `element`'s weight by `amount`. No-op when `amount` is 0.
    ///
    /// The added weight is visible to the next `draw`, so reinforcement
    /// compounds within a round.
    fn reinforce(&mut self, element: Element, amount: u64) -> Result<(), UrnError>;

    /// Add brand-new elements, each with initial weight 1.
    ///
    /// Callers obtain identifiers from an [`ElementAllocator`]; the pool
    /// never invents its own.
    fn inject(&mut self, elements: &[Element]) -> Result<(), UrnError>;

    /// Current sum of all weights.
    fn total_weight(&self) -> u64;

    /// Snapshot of `(element, weight)` pairs, sorted by element.
    fn contents(&mut self) -> Result<Vec<(Element, u64)>, UrnError>;

    /// Release backend resources; durable backends wipe their state here
    /// unless configured to leave it for inspection.
    fn finish(&mut self) -> Result<(), UrnError> {
        Ok(())
    }
}

/// An ordered set of pools with a current-pool cursor and a swap rule.
///
/// Before each individual draw (not once per round), the cursor moves to a
/// uniformly chosen *different* pool with probability `swap_probability`.
/// A single-pool set leaves the swap rule inert and consumes no randomness
/// for it. Expansion allocates from the shared [`ElementAllocator`], so
/// identifiers stay unique across pools.
pub struct PoolSet<P: WeightedPool> {
    pools: Vec<P>,
    current: usize,
    swap_probability: f64,
    allocator: ElementAllocator,
}

impl<P: WeightedPool> PoolSet<P> {
    /// Build a pool set. `pools` must be non-empty and `swap_probability`
    /// within `[0, 1]`.
    pub fn new(
        pools: Vec<P>,
        swap_probability: f64,
        allocator: ElementAllocator,
    ) -> Result<Self, UrnError> {
        if pools.is_empty() {
            return Err(UrnError::Config("pool set needs at least one pool".into()));
        }
        if !(0.0..=1.0).contains(&swap_probability) {
            return Err(UrnError::Config(format!(
                "swap_probability must be within [0, 1], got {}",
                swap_probability
            )));
        }
        Ok(Self {
            pools,
            current: 0,
            swap_probability,
            allocator,
        })
    }

    /// Single-pool set; the swap rule never fires.
    pub fn single(pool: P, allocator: ElementAllocator) -> Self {
        Self {
            pools: vec![pool],
            current: 0,
            swap_probability: 0.0,
            allocator,
        }
    }

    /// Index of the pool the next draw would use (before any swap).
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Number of pools in the set.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// True when the set holds no pools. `new` rejects this, so a
    /// constructed set always returns false.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn maybe_swap(&mut self, rng: &mut StdRng) {
        if self.pools.len() < 2 || self.swap_probability <= 0.0 {
            return;
        }
        if rng.gen::<f64>() < self.swap_probability {
            let mut target = rng.gen_range(0..self.pools.len() - 1);
            if target >= self.current {
                target += 1;
            }
            self.current = target;
        }
    }

    /// Apply the swap rule, then draw from the current pool.
    pub fn draw(&mut self, rng: &mut StdRng) -> Result<Element, UrnError> {
        self.maybe_swap(rng);
        self.pools[self.current].draw(rng)
    }

    /// Reinforce `element` in the current pool.
    pub fn reinforce(&mut self, element: Element, amount: u64) -> Result<(), UrnError> {
        self.pools[self.current].reinforce(element, amount)
    }

    /// Allocate `count` fresh identifiers and inject them into the current
    /// pool with weight 1 each. Returns the new identifiers.
    pub fn expand(&mut self, count: u64) -> Result<Vec<Element>, UrnError> {
        let fresh = self.allocator.take(count);
        self.pools[self.current].inject(&fresh)?;
        Ok(fresh)
    }

    /// Sum of all pools' total weights.
    pub fn total_weight(&self) -> u64 {
        self.pools.iter().map(|p| p.total_weight()).sum()
    }

    /// Per-pool content snapshots, in pool order.
    pub fn contents(&mut self) -> Result<Vec<Vec<(Element, u64)>>, UrnError> {
        self.pools.iter_mut().map(|p| p.contents()).collect()
    }

    /// Finish every pool in order.
    pub fn finish(&mut self) -> Result<(), UrnError> {
        for pool in &mut self.pools {
            pool.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPool;
    use super::*;
    use rand::SeedableRng;

    fn two_pool_set(swap_probability: f64) -> PoolSet<MemoryPool> {
        let pools = vec![MemoryPool::with_base(0, 4), MemoryPool::with_base(4, 4)];
        PoolSet::new(pools, swap_probability, ElementAllocator::starting_at(8)).unwrap()
    }

    #[test]
    fn allocator_hands_out_consecutive_unique_ids() {
        let mut alloc = ElementAllocator::starting_at(10);
        assert_eq!(alloc.take(3), vec![10, 11, 12]);
        assert_eq!(alloc.take(2), vec![13, 14]);
        assert_eq!(alloc.peek(), 15);
    }

    #[test]
    fn empty_pool_set_is_rejected() {
        let err = PoolSet::<MemoryPool>::new(vec![], 0.0, ElementAllocator::starting_at(0));
        assert!(matches!(err, Err(UrnError::Config(_))));
    }

    #[test]
    fn out_of_range_swap_probability_is_rejected() {
        let pools = vec![MemoryPool::with_base(0, 1)];
        let err = PoolSet::new(pools, 1.5, ElementAllocator::starting_at(1));
        assert!(matches!(err, Err(UrnError::Config(_))));
    }

    #[test]
    fn swap_probability_one_always_moves_to_the_other_pool() {
        let mut set = two_pool_set(1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut last = set.current_index();
        for _ in 0..20 {
            set.draw(&mut rng).unwrap();
            assert_ne!(set.current_index(), last);
            last = set.current_index();
        }
    }

    #[test]
    fn swap_probability_zero_never_moves() {
        let mut set = two_pool_set(0.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            set.draw(&mut rng).unwrap();
            assert_eq!(set.current_index(), 0);
        }
    }

    #[test]
    fn expansion_ids_are_unique_across_pools() {
        let mut set = two_pool_set(1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10 {
            set.draw(&mut rng).unwrap();
            for id in set.expand(3).unwrap() {
                assert!(seen.insert(id), "duplicate expansion id {}", id);
            }
        }
        assert_eq!(set.total_weight(), 8 + 30);
    }
}
