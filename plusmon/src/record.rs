//! The value type handed to a [`crate::sink::Sink`].

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{catalog::MetricKind, dimension::DimensionSet};

/// One metric observation, created by an emitter and consumed once by a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Dotted metric name, e.g. `server.zone.requests`
    pub name: &'static str,
    /// Counter or gauge
    pub kind: MetricKind,
    /// The observed value
    pub value: f64,
    /// Identity of the polled server, `address:port`
    pub instance_id: String,
    /// Scope dimensions with global dimensions applied on top
    pub dimensions: DimensionSet,
    /// When the value was captured
    pub timestamp: SystemTime,
}

impl MetricRecord {
    /// Milliseconds since the Unix epoch at which this record was captured.
    ///
    /// Clocks set before the epoch report zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[name={},type={},value={},instance_id={},dimensions={{{}}},timestamp={}]",
            self.name,
            self.kind.as_str(),
            self.value,
            self.instance_id,
            self.dimensions,
            self.timestamp_millis(),
        )
    }
}
