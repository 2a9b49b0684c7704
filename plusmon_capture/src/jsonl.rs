//! JSON lines capture output.
//!
//! One [`line::Line`] per line. The caller decides when a read cycle is over
//! and calls [`Writer::flush`] then.

use std::io::Write;

use crate::line;

/// Errors produced by [`Writer`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The capture destination rejected a write or flush.
    #[error("Capture write failed: {0}")]
    Io(#[from] std::io::Error),
    /// A line could not be encoded.
    #[error("Capture line not encodable: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes capture lines to `W`, newline terminated.
#[derive(Debug)]
pub struct Writer<W: Write> {
    writer: W,
}

impl<W: Write> Writer<W> {
    /// Wrap `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append `line`.
    ///
    /// # Errors
    ///
    /// Returns an error if `line` cannot be encoded or written.
    pub fn write_line(&mut self, line: &line::Line) -> Result<(), Error> {
        let payload = serde_json::to_string(line)?;
        self.writer.write_all(payload.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Push buffered lines through to the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be flushed.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, BufWriter};

    use super::*;
    use crate::line::{Line, MetricKind};
    use rustc_hash::FxHashMap;
    use uuid::Uuid;

    fn line(name: &str, fetch_index: u64) -> Line {
        let mut labels = FxHashMap::default();
        labels.insert("server.zone.name".to_string(), "hg.nginx.org".to_string());
        Line {
            run_id: Uuid::new_v4(),
            time: 1_000,
            fetch_index,
            instance: "10.0.0.1:8080".to_string(),
            metric_name: name.to_string(),
            metric_kind: MetricKind::Counter,
            value: 465_034.0,
            labels,
        }
    }

    #[test]
    fn writes_valid_jsonl() {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);

        writer
            .write_line(&line("server.zone.requests", 0))
            .expect("write should succeed");

        let output = String::from_utf8(buffer).expect("should be valid UTF-8");
        assert!(output.ends_with('\n'), "should end with newline");

        let parsed: Line = serde_json::from_str(output.trim()).expect("should deserialize");
        assert_eq!(parsed.metric_name, "server.zone.requests");
        assert_eq!(parsed.instance, "10.0.0.1:8080");
        assert_eq!(
            parsed.labels.get("server.zone.name").map(String::as_str),
            Some("hg.nginx.org")
        );
    }

    #[test]
    fn labels_are_nested_under_their_own_key() {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        writer
            .write_line(&line("server.zone.requests", 3))
            .expect("write should succeed");

        let output = String::from_utf8(buffer).expect("should be valid UTF-8");
        let raw: serde_json::Value = serde_json::from_str(output.trim()).expect("valid json");
        assert_eq!(raw["labels"]["server.zone.name"], "hg.nginx.org");
        assert!(raw.get("server.zone.name").is_none());
        assert_eq!(raw["metric_kind"], "counter");
        assert_eq!(raw["fetch_index"], 3);
    }

    #[test]
    fn labels_named_like_fields_survive_a_round_trip() {
        let mut shadowing = line("server.zone.requests", 7);
        shadowing
            .labels
            .insert("value".to_string(), "operator".to_string());
        shadowing
            .labels
            .insert("instance".to_string(), "edge".to_string());

        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        writer.write_line(&shadowing).expect("write should succeed");

        let output = String::from_utf8(buffer).expect("should be valid UTF-8");
        let parsed: Line = serde_json::from_str(output.trim()).expect("should deserialize");
        assert_eq!(parsed, shadowing);
        assert_eq!(parsed.instance, "10.0.0.1:8080");
        assert!((parsed.value - 465_034.0).abs() < f64::EPSILON);
    }

    #[test]
    fn multiple_writes_reach_a_file() {
        let tmp = tempfile::NamedTempFile::new().expect("tempfile");
        {
            let file = tmp.reopen().expect("reopen");
            let mut writer = Writer::new(BufWriter::new(file));
            for i in 0..5 {
                writer
                    .write_line(&line(&format!("metric_{i}"), i))
                    .expect("write should succeed");
            }
            writer.flush().expect("flush should succeed");
        }

        let reader = BufReader::new(tmp.reopen().expect("reopen"));
        let lines: Vec<String> = reader.lines().map(|l| l.expect("line")).collect();
        assert_eq!(lines.len(), 5, "should have 5 lines");
        for (i, raw) in lines.iter().enumerate() {
            let parsed: Line = serde_json::from_str(raw).expect("should deserialize");
            assert_eq!(parsed.metric_name, format!("metric_{i}"));
            assert_eq!(parsed.fetch_index, i as u64);
        }
    }
}
