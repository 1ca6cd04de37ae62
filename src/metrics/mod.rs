//! Result Pipeline (C3) and Metrics Aggregator (C4): §4.3.

mod collector;
mod histogram;
mod types;

pub use collector::{Collector, PipelineEvent, Snapshot, spawn};
pub use histogram::LatencyHistogram;
pub use types::{LabelSnapshot, LatencyStats, Metrics};
