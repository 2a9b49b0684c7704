//! Destinations for emitted [`MetricRecord`] values.
//!
//! The core never pushes metrics anywhere itself; every read cycle is handed a
//! [`Sink`] by its host. Three sinks are provided:
//!
//! * `Vec<MetricRecord>`, which simply collects records,
//! * [`MetricsSink`], which records through the `metrics` facade so that any
//!   installed recorder, e.g. the Prometheus exporter, sees them,
//! * [`CaptureSink`], which writes JSON lines to a capture file.

use std::{fs, io, io::BufWriter, path::Path};

use metrics::{counter, gauge};
use plusmon_capture::{jsonl, line};
use tracing::{error, trace, warn};
use uuid::Uuid;

use crate::{catalog::MetricKind, dimension::DimensionSet, record::MetricRecord};

/// Label under which [`MetricsSink`] reports a record's instance id.
pub const INSTANCE_LABEL: &str = "instance";

/// A consumer of metric records.
pub trait Sink {
    /// Consume one record.
    fn emit(&mut self, record: MetricRecord);

    /// Called by the host once a read cycle has finished emitting.
    fn flush(&mut self) {}
}

impl Sink for Vec<MetricRecord> {
    fn emit(&mut self, record: MetricRecord) {
        self.push(record);
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn emit(&mut self, record: MetricRecord) {
        (**self).emit(record);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

/// Sink that records through the globally installed `metrics` recorder.
///
/// Labels are [`INSTANCE_LABEL`] followed by the record's dimensions, one label
/// per key. A dimension named [`INSTANCE_LABEL`] replaces the instance id.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl MetricsSink {
    /// Create a new [`MetricsSink`]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Sink for MetricsSink {
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_possible_truncation)]
    fn emit(&mut self, record: MetricRecord) {
        let name = record.name;
        let value = record.value;
        if value.is_nan() {
            warn!("Skipping NaN value for {name}");
            return;
        }

        let mut dimensions = DimensionSet::new();
        dimensions.insert(INSTANCE_LABEL, record.instance_id);
        dimensions.merge(&record.dimensions);
        let labels: Vec<(String, String)> = dimensions
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        match record.kind {
            MetricKind::Gauge => {
                trace!("gauge: {name} = {value}");
                gauge!(name, &labels).set(value);
            }
            MetricKind::Counter => {
                if value < 0.0 {
                    warn!("Negative counter value unhandled for {name}");
                    return;
                }
                if value > u64::MAX as f64 {
                    warn!("Counter value above maximum limit for {name}");
                    return;
                }
                // Sign and range are checked above.
                let value = value as u64;
                trace!("counter: {name} = {value}");
                counter!(name, &labels).absolute(value);
            }
        }
    }
}

/// Errors produced by [`CaptureSink`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Could not create the capture file
    #[error("Failed to create capture file: {0}")]
    Io(#[from] io::Error),
}

/// Sink that writes every record as one JSON line.
///
/// A line's labels are the global labels with the record's dimensions applied
/// on top. They are written apart from the line's own fields.
#[derive(Debug)]
pub struct CaptureSink<W: io::Write> {
    writer: jsonl::Writer<W>,
    run_id: Uuid,
    fetch_index: u64,
    global_labels: DimensionSet,
}

impl CaptureSink<BufWriter<fs::File>> {
    /// Create a [`CaptureSink`] writing to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Function will error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        global_labels: DimensionSet,
    ) -> Result<Self, Error> {
        let file = fs::File::create(path)?;
        Ok(Self::new(BufWriter::new(file), global_labels))
    }
}

impl<W: io::Write> CaptureSink<W> {
    /// Create a [`CaptureSink`] over an arbitrary writer.
    #[must_use]
    pub fn new(writer: W, global_labels: DimensionSet) -> Self {
        Self {
            writer: jsonl::Writer::new(writer),
            run_id: Uuid::new_v4(),
            fetch_index: 0,
            global_labels,
        }
    }

    /// The number of completed flushes, stamped on every line as its
    /// `fetch_index`.
    #[must_use]
    pub fn fetch_index(&self) -> u64 {
        self.fetch_index
    }
}

impl<W: io::Write> Sink for CaptureSink<W> {
    fn emit(&mut self, record: MetricRecord) {
        let time = record.timestamp_millis();
        let labels = self
            .global_labels
            .merged(&record.dimensions)
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let metric_kind = match record.kind {
            MetricKind::Counter => line::MetricKind::Counter,
            MetricKind::Gauge => line::MetricKind::Gauge,
        };
        let line = line::Line {
            run_id: self.run_id,
            time,
            fetch_index: self.fetch_index,
            instance: record.instance_id,
            metric_name: record.name.to_string(),
            metric_kind,
            value: record.value,
            labels,
        };
        if let Err(err) = self.writer.write_line(&line) {
            error!("Failed to write capture line: {err}");
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            error!("Failed to flush capture file: {err}");
        }
        self.fetch_index += 1;
    }
}

#[allow(clippy::mutable_key_type)] // CompositeKey has interior mutability
#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use metrics::{Key, Label};
    use metrics_util::{
        CompositeKey, MetricKind as DebugKind,
        debugging::{DebugValue, DebuggingRecorder},
    };

    use super::*;

    fn record(name: &'static str, kind: MetricKind, value: f64) -> MetricRecord {
        MetricRecord {
            name,
            kind,
            value,
            instance_id: "10.0.0.1:8080".to_string(),
            dimensions: [("server.zone.name", "zoneA"), ("nginx.version", "1.13.4")]
                .into_iter()
                .collect(),
            timestamp: SystemTime::now(),
        }
    }

    fn labels() -> Vec<Label> {
        vec![
            Label::new("instance", "10.0.0.1:8080"),
            Label::new("server.zone.name", "zoneA"),
            Label::new("nginx.version", "1.13.4"),
        ]
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<MetricRecord> = Vec::new();
        sink.emit(record("server.zone.requests", MetricKind::Counter, 100.0));
        sink.flush();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].name, "server.zone.requests");
    }

    #[test]
    fn metrics_sink_records_counters_and_gauges() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let mut sink = MetricsSink::new();
            sink.emit(record("server.zone.requests", MetricKind::Counter, 100.0));
            sink.emit(record("server.zone.processing", MetricKind::Gauge, 3.0));
        });

        let snapshot = snapshotter.snapshot().into_hashmap();
        assert_eq!(snapshot.len(), 2);

        let counter = snapshot
            .get(&CompositeKey::new(
                DebugKind::Counter,
                Key::from_parts("server.zone.requests", labels()),
            ))
            .expect("metric not found");
        match counter.2 {
            DebugValue::Counter(v) => assert_eq!(v, 100),
            _ => panic!("unexpected metric type"),
        }

        let gauge = snapshot
            .get(&CompositeKey::new(
                DebugKind::Gauge,
                Key::from_parts("server.zone.processing", labels()),
            ))
            .expect("metric not found");
        match gauge.2 {
            DebugValue::Gauge(v) => assert_eq!(v, 3.0),
            _ => panic!("unexpected metric type"),
        }
    }

    #[test]
    fn metrics_sink_emits_one_instance_label() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let mut rec = record("server.zone.requests", MetricKind::Counter, 5.0);
        rec.dimensions.insert("instance", "edge");
        metrics::with_local_recorder(&recorder, || {
            MetricsSink::new().emit(rec);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(snapshot.len(), 1);
        let (key, _, _, _) = &snapshot[0];
        let instance_labels: Vec<&str> = key
            .key()
            .labels()
            .filter(|label| label.key() == INSTANCE_LABEL)
            .map(Label::value)
            .collect();
        assert_eq!(instance_labels, vec!["edge"]);
        assert_eq!(key.key().labels().count(), 3);
    }

    #[test]
    fn metrics_sink_skips_unrepresentable_values() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let mut sink = MetricsSink::new();
            sink.emit(record("connections.accepted", MetricKind::Counter, -1.0));
            sink.emit(record("connections.dropped", MetricKind::Counter, f64::NAN));
            sink.emit(record("connections.idle", MetricKind::Gauge, f64::NAN));
        });

        assert_eq!(snapshotter.snapshot().into_hashmap().len(), 0);
    }

    #[test]
    fn capture_sink_writes_lines() {
        let global_labels: DimensionSet = [("region", "us-east-1")].into_iter().collect();

        let mut buffer: Vec<u8> = Vec::new();
        {
            let mut sink = CaptureSink::new(&mut buffer, global_labels);
            sink.emit(record("server.zone.requests", MetricKind::Counter, 100.0));
            sink.flush();
            sink.emit(record("server.zone.requests", MetricKind::Counter, 150.0));
            sink.flush();
            assert_eq!(sink.fetch_index(), 2);
        }

        let output = String::from_utf8(buffer).expect("valid utf-8");
        let lines: Vec<line::Line> = output
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].fetch_index, 0);
        assert_eq!(lines[1].fetch_index, 1);
        assert_eq!(lines[0].run_id, lines[1].run_id);
        assert_eq!(lines[1].value, 150.0);
        assert_eq!(lines[0].instance, "10.0.0.1:8080");
        assert_eq!(lines[0].metric_kind, line::MetricKind::Counter);
        assert_eq!(lines[0].labels.get("region").map(String::as_str), Some("us-east-1"));
        assert_eq!(
            lines[0].labels.get("server.zone.name").map(String::as_str),
            Some("zoneA")
        );
    }

    #[test]
    fn capture_sink_keeps_fields_when_labels_share_their_names() {
        let global_labels: DimensionSet = [("value", "global"), ("region", "us-east-1")]
            .into_iter()
            .collect();
        let mut rec = record("connections.active", MetricKind::Gauge, 7.0);
        rec.dimensions.insert("value", "operator");
        rec.dimensions.insert("instance", "x");

        let mut buffer: Vec<u8> = Vec::new();
        {
            let mut sink = CaptureSink::new(&mut buffer, global_labels);
            sink.emit(rec);
            sink.flush();
        }

        let output = String::from_utf8(buffer).expect("valid utf-8");
        let line: line::Line = serde_json::from_str(output.trim()).expect("valid line");
        assert_eq!(line.instance, "10.0.0.1:8080");
        assert_eq!(line.value, 7.0);
        assert_eq!(line.labels.get("value").map(String::as_str), Some("operator"));
        assert_eq!(line.labels.get("instance").map(String::as_str), Some("x"));
        assert_eq!(line.labels.get("region").map(String::as_str), Some("us-east-1"));
    }

    #[test]
    fn capture_sink_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.jsonl");
        {
            let mut sink = CaptureSink::create(&path, DimensionSet::new()).expect("created");
            let mut dims = DimensionSet::new();
            dims.insert("cache.name", "http_cache");
            let mut rec = record("caches.size", MetricKind::Gauge, 42.0);
            rec.dimensions = dims;
            sink.emit(rec);
            sink.flush();
        }
        let contents = std::fs::read_to_string(&path).expect("readable");
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"cache.name\":\"http_cache\""));
    }
}
