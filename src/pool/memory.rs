//! In-memory pool backend.
//!
//! Weight is indexed by an append-only list of segments over the cumulative
//! weight axis: every reinforcement or injection appends one segment, and a
//! draw locates the segment owning a uniform value in `[0, total_weight)`
//! by binary search over the segment end offsets. This keeps draws
//! logarithmic and memory proportional to the number of mutation events and
//! distinct elements, never to the cumulative weight itself.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::UrnError;
use crate::pool::{Element, WeightedPool};

#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Exclusive end of this segment on the cumulative weight axis.
    end: u64,
    element: Element,
}

/// Weighted pool held entirely in process memory.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    segments: Vec<Segment>,
    weights: HashMap<Element, u64>,
    total: u64,
}

impl MemoryPool {
    /// Pool seeded with `count` elements `first, first+1, ..`, weight 1 each.
    pub fn with_base(first: Element, count: u64) -> Self {
        let mut pool = Self {
            segments: Vec::with_capacity(count as usize),
            weights: HashMap::with_capacity(count as usize),
            total: 0,
        };
        for element in first..first + count {
            pool.push_segment(element, 1);
        }
        pool
    }

    fn push_segment(&mut self, element: Element, amount: u64) {
        self.total += amount;
        self.segments.push(Segment {
            end: self.total,
            element,
        });
        *self.weights.entry(element).or_insert(0) += amount;
    }

    /// Current weight of `element`, 0 if absent.
    pub fn weight_of(&self, element: Element) -> u64 {
        self.weights.get(&element).copied().unwrap_or(0)
    }

    /// Number of distinct elements in the pool.
    pub fn distinct_elements(&self) -> usize {
        self.weights.len()
    }
}

impl WeightedPool for MemoryPool {
    fn draw(&mut self, rng: &mut StdRng) -> Result<Element, UrnError> {
        if self.total == 0 {
            return Err(UrnError::EmptyPool);
        }
        let x = rng.gen_range(0..self.total);
        let idx = self.segments.partition_point(|s| s.end <= x);
        match self.segments.get(idx) {
            Some(segment) => Ok(segment.element),
            None => Err(UrnError::Invariant(format!(
                "cumulative index lookup failed for offset {} of {}",
                x, self.total
            ))),
        }
    }

    fn reinforce(&mut self, element: Element, amount: u64) -> Result<(), UrnError> {
        if amount == 0 {
            return Ok(());
        }
        if !self.weights.contains_key(&element) {
            return Err(UrnError::Invariant(format!(
                "reinforce of unknown element {}",
                element
            )));
        }
        self.push_segment(element, amount);
        Ok(())
    }

    fn inject(&mut self, elements: &[Element]) -> Result<(), UrnError> {
        for &element in elements {
            if self.weights.contains_key(&element) {
                return Err(UrnError::Invariant(format!(
                    "injected element {} already present",
                    element
                )));
            }
            self.push_segment(element, 1);
        }
        Ok(())
    }

    fn total_weight(&self) -> u64 {
        self.total
    }

    fn contents(&mut self) -> Result<Vec<(Element, u64)>, UrnError> {
        let mut pairs: Vec<(Element, u64)> = self.weights.iter().map(|(&e, &w)| (e, w)).collect();
        pairs.sort_unstable_by_key(|&(e, _)| e);
        Ok(pairs)
    }
}
