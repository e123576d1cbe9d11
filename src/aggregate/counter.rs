use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::aggregate::spill::{SpillFile, SpillStore};
use crate::error::AnalyzerError;

/// Hash levels a partition may be re-split through before the merge gives up.
const MAX_SPLIT_LEVELS: u32 = 8;

/// A mergeable per-key partial aggregate.
pub trait Aggregate: Copy + Serialize + DeserializeOwned {
    fn merge(&mut self, other: Self);

    /// Occurrences folded into this aggregate.
    fn count(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hits(pub u64);

impl Aggregate for Hits {
    fn merge(&mut self, other: Self) {
        self.0 += other.0;
    }

    fn count(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub count: u64,
    pub total_ms: u128,
}

impl Timing {
    pub fn sample(response_time_ms: u128) -> Self {
        Timing {
            count: 1,
            total_ms: response_time_ms,
        }
    }
}

impl Aggregate for Timing {
    fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.total_ms = self.total_ms.saturating_add(other.total_ms);
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug, Clone)]
pub struct CounterLimits {
    pub slot_budget: usize,
    pub partitions: usize,
    pub scratch_dir: Option<PathBuf>,
    pub scratch_limit_bytes: u64,
}

/// Exact per-key aggregation with at most `slot_budget` keys in memory.
///
/// When a new key would overflow the table, the less frequent half of the
/// table is appended to hash-partitioned scratch files. [`snapshot`]
/// merges those partitions back one at a time, so every key is reported
/// once with its exact total. A partition that still holds more than
/// `slot_budget` distinct keys is re-split on a deeper hash level.
///
/// [`snapshot`]: BoundedCounter::snapshot
pub struct BoundedCounter<A: Aggregate> {
    table: AHashMap<String, A>,
    slot_budget: usize,
    spill: SpillStore,
    spills: u64,
}

impl<A: Aggregate> BoundedCounter<A> {
    pub fn new(label: &'static str, limits: CounterLimits) -> Self {
        let slot_budget = limits.slot_budget.max(1);
        BoundedCounter {
            table: AHashMap::with_capacity(slot_budget.min(1 << 16)),
            slot_budget,
            spill: SpillStore::new(
                label,
                limits.scratch_dir,
                limits.partitions,
                limits.scratch_limit_bytes,
            ),
            spills: 0,
        }
    }

    pub fn record(&mut self, key: &str, sample: A) -> Result<(), AnalyzerError> {
        if let Some(aggregate) = self.table.get_mut(key) {
            aggregate.merge(sample);
            return Ok(());
        }
        if self.table.len() >= self.slot_budget {
            self.evict_cold_half()?;
        }
        self.table.insert(key.to_owned(), sample);
        Ok(())
    }

    pub fn resident_keys(&self) -> usize {
        self.table.len()
    }

    pub fn spill_count(&self) -> u64 {
        self.spills
    }

    fn evict_cold_half(&mut self) -> Result<(), AnalyzerError> {
        let mut entries: Vec<(String, A)> = self.table.drain().collect();
        let keep = self.slot_budget / 2;
        if keep < entries.len() {
            entries.select_nth_unstable_by(keep, |a, b| b.1.count().cmp(&a.1.count()));
        }
        let cold = entries.split_off(keep.min(entries.len()));
        self.table.extend(entries);

        tracing::debug!(spilled = cold.len(), resident = self.table.len(), "counter spill");
        self.spill.append(cold)?;
        self.spills += 1;
        Ok(())
    }

    /// Visits every key exactly once with its exact aggregate, then
    /// releases all scratch storage.
    pub fn snapshot<F>(mut self, mut visit: F) -> Result<(), AnalyzerError>
    where
        F: FnMut(String, A),
    {
        if !self.spill.has_spilled() {
            for (key, aggregate) in self.table.drain() {
                visit(key, aggregate);
            }
            return Ok(());
        }

        let resident: Vec<(String, A)> = self.table.drain().collect();
        self.spill.append(resident)?;
        self.table.shrink_to_fit();

        for file in self.spill.seal()? {
            self.merge_partition(&file, &mut visit)?;
        }
        Ok(())
    }

    fn merge_partition<F>(&mut self, file: &SpillFile, visit: &mut F) -> Result<(), AnalyzerError>
    where
        F: FnMut(String, A),
    {
        let mut merged: AHashMap<String, A> = AHashMap::new();
        let mut oversized = false;

        for record in self.spill.read::<A>(file)? {
            let (key, aggregate) = record?;
            if let Some(existing) = merged.get_mut(&key) {
                existing.merge(aggregate);
            } else if merged.len() >= self.slot_budget {
                oversized = true;
                break;
            } else {
                merged.insert(key, aggregate);
            }
        }

        if oversized {
            drop(merged);
            if file.level + 1 >= MAX_SPLIT_LEVELS {
                return Err(AnalyzerError::ResourceExhausted(format!(
                    "partition still exceeds {} keys after {} re-splits",
                    self.slot_budget, file.level
                )));
            }
            for child in self.spill.split::<A>(file)? {
                self.merge_partition(&child, visit)?;
            }
            return Ok(());
        }

        self.spill.remove(file)?;
        for (key, aggregate) in merged {
            visit(key, aggregate);
        }
        Ok(())
    }
}
