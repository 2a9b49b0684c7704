//! The structure of a single capture line.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// The kinds of metrics that are recorded in [`Line`].
pub enum MetricKind {
    /// A monotonically increasing value.
    Counter,
    /// A point-at-time value.
    Gauge,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
/// The structure of a capture file line.
pub struct Line {
    /// An id that is mostly unique to this run, allowing us to distinguish
    /// duplications of the same observational setup.
    pub run_id: Uuid,
    /// The time in milliseconds since the Unix epoch at which the value was
    /// read from the status endpoint.
    pub time: u64,
    /// The number of read cycles completed before this line was written.
    pub fetch_index: u64,
    /// The server instance this observation belongs to.
    pub instance: String,
    /// The name of the metric recorded by this line.
    pub metric_name: String,
    /// The kind of metric recorded by this line.
    pub metric_kind: MetricKind,
    /// The value of the metric on this line.
    pub value: f64,
    /// The labels associated with this metric. Kept in their own object so a
    /// label can never shadow one of the fields above.
    pub labels: FxHashMap<String, String>,
}
