use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::models::Seconds;

/// Keeps the `limit` greatest entries seen so far. Memory never exceeds
/// `limit` entries regardless of how many are offered.
pub struct TopK<E: Ord> {
    limit: usize,
    heap: BinaryHeap<Reverse<E>>,
}

impl<E: Ord> TopK<E> {
    pub fn new(limit: usize) -> Self {
        TopK {
            limit,
            heap: BinaryHeap::with_capacity(limit.min(1024) + 1),
        }
    }

    pub fn offer(&mut self, entry: E) {
        if self.limit == 0 {
            return;
        }
        if self.heap.len() < self.limit {
            self.heap.push(Reverse(entry));
            return;
        }
        let beats_worst = self
            .heap
            .peek()
            .is_some_and(|Reverse(worst)| entry > *worst);
        if beats_worst {
            self.heap.pop();
            self.heap.push(Reverse(entry));
        }
    }

    /// Best first.
    pub fn into_ranked(self) -> Vec<E> {
        let mut ranked: Vec<E> = self.heap.into_iter().map(|Reverse(e)| e).collect();
        ranked.sort_unstable_by(|a, b| b.cmp(a));
        ranked
    }
}

/// Ranks by count, then by address ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRank {
    pub ip: String,
    pub count: u64,
}

impl Ord for IpRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.ip.cmp(&self.ip))
    }
}

impl PartialOrd for IpRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ranks by mean response time as reported (rounded to hundredths), then
/// by path ascending, so the emitted order agrees with the emitted values.
#[derive(Debug, Clone)]
pub struct PathRank {
    pub path: String,
    pub count: u64,
    pub total_ms: u128,
}

impl PathRank {
    pub fn mean_seconds(&self) -> Seconds {
        Seconds::from_mean_ms(self.total_ms, self.count)
    }
}

impl Ord for PathRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mean_seconds()
            .cmp(&other.mean_seconds())
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl PartialOrd for PathRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PathRank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathRank {}
