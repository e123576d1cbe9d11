mod counter;
mod spill;
mod top_k;

pub use counter::{Aggregate, BoundedCounter, CounterLimits, Hits, Timing};
pub use top_k::{IpRank, PathRank, TopK};
