//! Binding of catalog tables to status resources.
//!
//! An [`Emitter`] knows which [`Resource`] its metrics come from, how that
//! resource's document is shaped (see [`Strategy`]) and which
//! [`MetricDefinition`] tables to read. Given the resource document it produces
//! one [`MetricRecord`] per metric per entity and hands each to a sink.
//!
//! Values whose path does not resolve to a number are skipped without comment;
//! servers of different releases expose different fields.

use std::time::SystemTime;

use serde_json::Value;
use tracing::debug;

use crate::{
    catalog::{self, MetricDefinition},
    client::Resource,
    dimension::DimensionSet,
    path,
    record::MetricRecord,
    sink::Sink,
};

/// Key of the peer field naming each peer.
const PEER_NAME_FIELD: &str = "name";
/// Key of the container field holding its peers.
const PEERS_FIELD: &str = "peers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a resource document maps onto entities.
pub enum Strategy {
    /// The document is a single object.
    Flat,
    /// The document maps entity name to entity object.
    Container {
        /// Dimension carrying the entity name
        dimension: &'static str,
    },
    /// The document maps container name to an object holding a `peers`
    /// array.
    ContainerPeer {
        /// Dimension carrying the container name
        container_dimension: &'static str,
        /// Dimension carrying each peer's `name`
        peer_dimension: &'static str,
        /// Metrics read from the container object itself, once per container
        container_metrics: &'static [MetricDefinition],
    },
}

/// The per-cycle context shared by every record an emitter produces.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Identity of the polled server
    pub instance_id: &'a str,
    /// Dimensions applied on top of every record's own dimensions
    pub global_dimensions: &'a DimensionSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One catalog group bound to its resource and extraction strategy.
pub struct Emitter {
    name: &'static str,
    resource: Resource,
    strategy: Strategy,
    metrics: &'static [MetricDefinition],
}

impl Emitter {
    /// Create a new [`Emitter`]
    ///
    /// For [`Strategy::ContainerPeer`] `metrics` are the peer level metrics.
    #[must_use]
    pub const fn new(
        name: &'static str,
        resource: Resource,
        strategy: Strategy,
        metrics: &'static [MetricDefinition],
    ) -> Self {
        Self {
            name,
            resource,
            strategy,
            metrics,
        }
    }

    /// Short name of the metric group, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The resource this emitter reads.
    #[must_use]
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// The extraction strategy of this emitter.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Extract every metric of this group from `document` into `sink`.
    ///
    /// Returns the number of records emitted.
    pub fn emit<S: Sink + ?Sized>(&self, document: &Value, scope: Scope<'_>, sink: &mut S) -> usize {
        debug!("Emitting {} metrics", self.name);
        match self.strategy {
            Strategy::Flat => {
                fetch_and_emit(document, self.metrics, &DimensionSet::new(), scope, sink)
            }
            Strategy::Container { dimension } => {
                build_container_keyed_metrics(document, dimension, self.metrics, scope, sink)
            }
            Strategy::ContainerPeer {
                container_dimension,
                peer_dimension,
                container_metrics,
            } => build_container_keyed_peer_metrics(
                document,
                container_dimension,
                peer_dimension,
                container_metrics,
                self.metrics,
                scope,
                sink,
            ),
        }
    }
}

/// Emit `metrics` once per container, tagging each record with
/// `{dimension: container name}`.
///
/// Given `{"zoneA": {"requests": 100}, "zoneB": {"requests": 50}}` and a
/// `server.zone.requests` metric at path `requests` this emits two records,
/// one with `server.zone.name=zoneA` and one with `server.zone.name=zoneB`.
pub fn build_container_keyed_metrics<S: Sink + ?Sized>(
    containers: &Value,
    dimension: &str,
    metrics: &[MetricDefinition],
    scope: Scope<'_>,
    sink: &mut S,
) -> usize {
    let Value::Object(containers) = containers else {
        return 0;
    };
    let mut emitted = 0;
    for (name, container) in containers {
        let mut dimensions = DimensionSet::new();
        dimensions.insert(dimension, name.as_str());
        emitted += fetch_and_emit(container, metrics, &dimensions, scope, sink);
    }
    emitted
}

/// Emit `container_metrics` once per container and `peer_metrics` once per
/// peer of each container.
///
/// Container level records carry `{container_dimension: container name}`. Peer
/// level records additionally carry `{peer_dimension: peer's name field}`; a
/// peer without a name is reported with the container dimension alone.
pub fn build_container_keyed_peer_metrics<S: Sink + ?Sized>(
    containers: &Value,
    container_dimension: &str,
    peer_dimension: &str,
    container_metrics: &[MetricDefinition],
    peer_metrics: &[MetricDefinition],
    scope: Scope<'_>,
    sink: &mut S,
) -> usize {
    let Value::Object(containers) = containers else {
        return 0;
    };
    let mut emitted = 0;
    for (name, container) in containers {
        let mut container_dims = DimensionSet::new();
        container_dims.insert(container_dimension, name.as_str());
        emitted += fetch_and_emit(container, container_metrics, &container_dims, scope, sink);

        let Some(Value::Array(peers)) = path::extract(container, PEERS_FIELD) else {
            continue;
        };
        for peer in peers {
            let mut peer_dims = container_dims.clone();
            if let Some(peer_name) = path::extract_string(peer, PEER_NAME_FIELD) {
                peer_dims.insert(peer_dimension, peer_name);
            }
            emitted += fetch_and_emit(peer, peer_metrics, &peer_dims, scope, sink);
        }
    }
    emitted
}

/// Emit every metric of `metrics` found in `scoped` with `dimensions` and then
/// the scope's global dimensions applied.
fn fetch_and_emit<S: Sink + ?Sized>(
    scoped: &Value,
    metrics: &[MetricDefinition],
    dimensions: &DimensionSet,
    scope: Scope<'_>,
    sink: &mut S,
) -> usize {
    let mut emitted = 0;
    for metric in metrics {
        let Some(value) = path::extract_f64(scoped, metric.path) else {
            continue;
        };
        sink.emit(MetricRecord {
            name: metric.name,
            kind: metric.kind,
            value,
            instance_id: scope.instance_id.to_string(),
            dimensions: dimensions.merged(scope.global_dimensions),
            timestamp: SystemTime::now(),
        });
        emitted += 1;
    }
    emitted
}

/// Which optional metric groups are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Groups {
    /// Detailed server zone metrics
    pub server_zone: bool,
    /// Shared memory zone metrics
    pub memory_zone: bool,
    /// Detailed upstream metrics
    pub upstream: bool,
    /// Cache metrics
    pub cache: bool,
    /// Detailed stream server zone metrics
    pub stream_server_zone: bool,
    /// Detailed stream upstream metrics
    pub stream_upstream: bool,
    /// Worker process metrics
    pub processes: bool,
}

const SERVER_ZONE: Strategy = Strategy::Container {
    dimension: "server.zone.name",
};
const STREAM_SERVER_ZONE: Strategy = Strategy::Container {
    dimension: "stream.server.zone.name",
};

/// The always-on emitters, in emission order.
pub static DEFAULT_EMITTERS: &[Emitter] = &[
    Emitter::new(
        "connections",
        Resource::Connections,
        Strategy::Flat,
        catalog::CONNECTION_METRICS,
    ),
    Emitter::new("ssl", Resource::Ssl, Strategy::Flat, catalog::SSL_METRICS),
    Emitter::new(
        "requests",
        Resource::Requests,
        Strategy::Flat,
        catalog::REQUEST_METRICS,
    ),
    Emitter::new(
        "server-zone",
        Resource::ServerZones,
        SERVER_ZONE,
        catalog::DEFAULT_SERVER_ZONE_METRICS,
    ),
    Emitter::new(
        "upstream",
        Resource::Upstreams,
        Strategy::ContainerPeer {
            container_dimension: "upstream.name",
            peer_dimension: "upstream.peer.name",
            container_metrics: &[],
        },
        catalog::DEFAULT_UPSTREAM_PEER_METRICS,
    ),
    Emitter::new(
        "stream-server-zone",
        Resource::StreamServerZones,
        STREAM_SERVER_ZONE,
        catalog::DEFAULT_STREAM_SERVER_ZONE_METRICS,
    ),
    Emitter::new(
        "stream-upstream",
        Resource::StreamUpstreams,
        Strategy::ContainerPeer {
            container_dimension: "stream.upstream.name",
            peer_dimension: "stream.upstream.peer.name",
            container_metrics: &[],
        },
        catalog::DEFAULT_STREAM_UPSTREAM_PEER_METRICS,
    ),
];

impl Groups {
    /// The opt-in emitters enabled by these flags, in emission order.
    #[must_use]
    pub fn emitters(&self) -> Vec<Emitter> {
        let mut emitters = Vec::new();
        if self.server_zone {
            emitters.push(Emitter::new(
                "server-zone-detail",
                Resource::ServerZones,
                SERVER_ZONE,
                catalog::SERVER_ZONE_METRICS,
            ));
        }
        if self.memory_zone {
            emitters.push(Emitter::new(
                "memory-zone",
                Resource::Slabs,
                Strategy::Container {
                    dimension: "memory.zone.name",
                },
                catalog::MEMORY_ZONE_METRICS,
            ));
        }
        if self.upstream {
            emitters.push(Emitter::new(
                "upstream-detail",
                Resource::Upstreams,
                Strategy::ContainerPeer {
                    container_dimension: "upstream.name",
                    peer_dimension: "upstream.peer.name",
                    container_metrics: catalog::UPSTREAM_CONTAINER_METRICS,
                },
                catalog::UPSTREAM_PEER_METRICS,
            ));
        }
        if self.cache {
            emitters.push(Emitter::new(
                "cache",
                Resource::Caches,
                Strategy::Container {
                    dimension: "cache.name",
                },
                catalog::CACHE_METRICS,
            ));
        }
        if self.stream_server_zone {
            emitters.push(Emitter::new(
                "stream-server-zone-detail",
                Resource::StreamServerZones,
                STREAM_SERVER_ZONE,
                catalog::STREAM_SERVER_ZONE_METRICS,
            ));
        }
        if self.stream_upstream {
            emitters.push(Emitter::new(
                "stream-upstream-detail",
                Resource::StreamUpstreams,
                Strategy::ContainerPeer {
                    container_dimension: "stream.upstream.name",
                    peer_dimension: "stream.upstream.peer.name",
                    container_metrics: catalog::STREAM_UPSTREAM_CONTAINER_METRICS,
                },
                catalog::STREAM_UPSTREAM_PEER_METRICS,
            ));
        }
        if self.processes {
            emitters.push(Emitter::new(
                "processes",
                Resource::Processes,
                Strategy::Flat,
                catalog::PROCESS_METRICS,
            ));
        }
        emitters
    }
}
