//! Static metric tables, grouped by status sub-resource.
//!
//! Each [`MetricDefinition`] names the emitted metric, its kind and the dotted
//! path of the value relative to the object it is read from. For container
//! keyed resources that object is one container, e.g. a single server zone,
//! and for upstreams it is one peer unless the table is a `*_CONTAINER_*` one.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The kind of an emitted metric.
pub enum MetricKind {
    /// A monotonically increasing value.
    Counter,
    /// A point-at-time value.
    Gauge,
}

impl MetricKind {
    /// The lower-case name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Definition of one metric to read from a status document.
pub struct MetricDefinition {
    /// Output metric name
    pub name: &'static str,
    /// Output metric kind
    pub kind: MetricKind,
    /// Dotted path of the value within its scope object
    pub path: &'static str,
}

impl MetricDefinition {
    const fn counter(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            path,
        }
    }

    const fn gauge(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            path,
        }
    }
}

use MetricDefinition as M;

//
// Always-on groups
//

/// Client connection totals, read from `connections`.
pub static CONNECTION_METRICS: &[MetricDefinition] = &[
    M::counter("connections.accepted", "accepted"),
    M::counter("connections.dropped", "dropped"),
    M::gauge("connections.active", "active"),
    M::gauge("connections.idle", "idle"),
];

/// SSL handshake totals, read from `ssl`.
pub static SSL_METRICS: &[MetricDefinition] = &[
    M::counter("ssl.handshakes.successful", "handshakes"),
    M::counter("ssl.handshakes.failed", "handshakes_failed"),
    M::counter("ssl.sessions.reuses", "session_reuses"),
];

/// Client request totals, read from `requests`.
pub static REQUEST_METRICS: &[MetricDefinition] = &[
    M::counter("requests.total", "total"),
    M::gauge("requests.current", "current"),
];

/// Per server zone request count.
pub static DEFAULT_SERVER_ZONE_METRICS: &[MetricDefinition] =
    &[M::counter("server.zone.requests", "requests")];

/// Per upstream peer request count.
pub static DEFAULT_UPSTREAM_PEER_METRICS: &[MetricDefinition] =
    &[M::counter("upstreams.requests", "requests")];

/// Per stream server zone connection count.
pub static DEFAULT_STREAM_SERVER_ZONE_METRICS: &[MetricDefinition] =
    &[M::counter("stream.server.zone.connections", "connections")];

/// Per stream upstream peer connection count.
pub static DEFAULT_STREAM_UPSTREAM_PEER_METRICS: &[MetricDefinition] =
    &[M::counter("stream.upstreams.connections", "connections")];

//
// Opt-in groups
//

/// Detailed server zone metrics, enabled by `ServerZone`.
pub static SERVER_ZONE_METRICS: &[MetricDefinition] = &[
    M::gauge("server.zone.processing", "processing"),
    M::counter("server.zone.discarded", "discarded"),
    M::counter("server.zone.responses.total", "responses.total"),
    M::counter("server.zone.responses.1xx", "responses.1xx"),
    M::counter("server.zone.responses.2xx", "responses.2xx"),
    M::counter("server.zone.responses.3xx", "responses.3xx"),
    M::counter("server.zone.responses.4xx", "responses.4xx"),
    M::counter("server.zone.responses.5xx", "responses.5xx"),
    M::counter("server.zone.bytes.received", "received"),
    M::counter("server.zone.bytes.sent", "sent"),
];

/// Shared memory zone usage, enabled by `MemoryZone`.
pub static MEMORY_ZONE_METRICS: &[MetricDefinition] = &[
    M::gauge("zone.pages.used", "pages.used"),
    M::gauge("zone.pages.free", "pages.free"),
];

/// Detailed upstream peer metrics, enabled by `Upstream`.
pub static UPSTREAM_PEER_METRICS: &[MetricDefinition] = &[
    M::gauge("upstreams.active", "active"),
    M::counter("upstreams.responses.total", "responses.total"),
    M::counter("upstreams.responses.1xx", "responses.1xx"),
    M::counter("upstreams.responses.2xx", "responses.2xx"),
    M::counter("upstreams.responses.3xx", "responses.3xx"),
    M::counter("upstreams.responses.4xx", "responses.4xx"),
    M::counter("upstreams.responses.5xx", "responses.5xx"),
    M::counter("upstreams.fails", "fails"),
    M::counter("upstreams.unavailable", "unavail"),
    M::counter("upstreams.health.checks.checks", "health_checks.checks"),
    M::counter("upstreams.health.checks.fails", "health_checks.fails"),
    M::counter("upstreams.health.checks.unhealthy", "health_checks.unhealthy"),
    M::counter("upstreams.bytes.sent", "sent"),
    M::counter("upstreams.bytes.received", "received"),
    M::gauge("upstreams.response.time", "response_time"),
    M::gauge("upstreams.header.time", "header_time"),
    M::counter("upstreams.downtime", "downtime"),
];

/// Upstream metrics read from the upstream itself, enabled by `Upstream`.
pub static UPSTREAM_CONTAINER_METRICS: &[MetricDefinition] = &[
    M::gauge("upstreams.keepalive", "keepalive"),
    M::gauge("upstreams.zombies", "zombies"),
];

/// Cache metrics, enabled by `Cache`.
pub static CACHE_METRICS: &[MetricDefinition] = &[
    M::gauge("caches.size", "size"),
    M::gauge("caches.size.max", "max_size"),
    M::counter("caches.hits", "hit.responses"),
    M::counter("caches.hits.bytes", "hit.bytes"),
    M::counter("caches.misses", "miss.responses"),
    M::counter("caches.misses.bytes", "miss.bytes"),
    M::counter("caches.bypass", "bypass.responses"),
    M::counter("caches.stale", "stale.responses"),
    M::counter("caches.updating", "updating.responses"),
    M::counter("caches.revalidated", "revalidated.responses"),
    M::counter("caches.expired", "expired.responses"),
];

/// Detailed stream server zone metrics, enabled by `StreamServerZone`.
pub static STREAM_SERVER_ZONE_METRICS: &[MetricDefinition] = &[
    M::gauge("stream.server.zone.processing", "processing"),
    M::counter("stream.server.zone.sessions.total", "sessions.total"),
    M::counter("stream.server.zone.sessions.2xx", "sessions.2xx"),
    M::counter("stream.server.zone.sessions.4xx", "sessions.4xx"),
    M::counter("stream.server.zone.sessions.5xx", "sessions.5xx"),
    M::counter("stream.server.zone.received", "received"),
    M::counter("stream.server.zone.sent", "sent"),
    M::counter("stream.server.zone.discarded", "discarded"),
];

/// Detailed stream upstream peer metrics, enabled by `StreamUpstream`.
pub static STREAM_UPSTREAM_PEER_METRICS: &[MetricDefinition] = &[
    M::gauge("stream.upstreams.active", "active"),
    M::gauge("stream.upstreams.connections.max", "max_conns"),
    M::counter("stream.upstreams.bytes.sent", "sent"),
    M::counter("stream.upstreams.bytes.received", "received"),
    M::counter("stream.upstreams.fails", "fails"),
    M::counter("stream.upstreams.unavailable", "unavail"),
    M::counter("stream.upstreams.health.checks.checks", "health_checks.checks"),
    M::counter("stream.upstreams.health.checks.fails", "health_checks.fails"),
    M::counter(
        "stream.upstreams.health.checks.unhealthy",
        "health_checks.unhealthy",
    ),
    M::gauge("stream.upstreams.connect.time", "connect_time"),
    M::gauge("stream.upstreams.first.byte.time", "first_byte_time"),
    M::gauge("stream.upstreams.response.time", "response_time"),
];

/// Stream upstream metrics read from the upstream itself, enabled by
/// `StreamUpstream`.
pub static STREAM_UPSTREAM_CONTAINER_METRICS: &[MetricDefinition] =
    &[M::gauge("stream.upstreams.zombies", "zombies")];

/// Worker process metrics, enabled by `Processes`.
pub static PROCESS_METRICS: &[MetricDefinition] =
    &[M::counter("processes.respawned", "respawned")];

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;

    fn all_tables() -> Vec<&'static [MetricDefinition]> {
        vec![
            CONNECTION_METRICS,
            SSL_METRICS,
            REQUEST_METRICS,
            DEFAULT_SERVER_ZONE_METRICS,
            DEFAULT_UPSTREAM_PEER_METRICS,
            DEFAULT_STREAM_SERVER_ZONE_METRICS,
            DEFAULT_STREAM_UPSTREAM_PEER_METRICS,
            SERVER_ZONE_METRICS,
            MEMORY_ZONE_METRICS,
            UPSTREAM_PEER_METRICS,
            UPSTREAM_CONTAINER_METRICS,
            CACHE_METRICS,
            STREAM_SERVER_ZONE_METRICS,
            STREAM_UPSTREAM_PEER_METRICS,
            STREAM_UPSTREAM_CONTAINER_METRICS,
            PROCESS_METRICS,
        ]
    }

    #[test]
    fn metric_names_are_unique() {
        let mut seen = FxHashSet::default();
        for table in all_tables() {
            for metric in table {
                assert!(seen.insert(metric.name), "duplicate metric {}", metric.name);
            }
        }
    }

    #[test]
    fn paths_are_well_formed() {
        for table in all_tables() {
            for metric in table {
                assert!(!metric.path.is_empty(), "{} has no path", metric.name);
                assert!(
                    metric.path.split('.').all(|segment| !segment.is_empty()),
                    "{} has an empty path segment",
                    metric.name
                );
            }
        }
    }

    #[test]
    fn instantaneous_levels_are_gauges() {
        let kind_of = |table: &[MetricDefinition], name: &str| {
            table
                .iter()
                .find(|metric| metric.name == name)
                .map(|metric| metric.kind)
        };
        assert_eq!(kind_of(CONNECTION_METRICS, "connections.active"), Some(MetricKind::Gauge));
        assert_eq!(kind_of(CONNECTION_METRICS, "connections.idle"), Some(MetricKind::Gauge));
        assert_eq!(kind_of(REQUEST_METRICS, "requests.current"), Some(MetricKind::Gauge));
        assert_eq!(kind_of(CONNECTION_METRICS, "connections.accepted"), Some(MetricKind::Counter));
        assert_eq!(kind_of(REQUEST_METRICS, "requests.total"), Some(MetricKind::Counter));
    }

    #[test]
    fn kind_names() {
        assert_eq!(MetricKind::Counter.as_str(), "counter");
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
    }
}
