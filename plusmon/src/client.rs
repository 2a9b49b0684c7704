//! NGINX Plus status API client
//!
//! NGINX Plus has exposed two incompatible status APIs over its history:
//!
//! * the legacy API rooted at `/status`, where every resource hangs directly
//!   off the root and the server version and address are leaf resources of
//!   their own, and
//! * the versioned API rooted at `/api/{version}`, where HTTP resources live
//!   under `http/` and a single `nginx` resource carries version and address.
//!
//! [`StatusClient`] determines once, at construction, which of the two a server
//! speaks and derives every resource URL from that shape's table. The result is
//! never re-negotiated: a server whose version changes underneath a client is
//! reported through [`StatusClient::validate_version`] instead.

pub mod transport;

use std::num::NonZeroU32;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::path;

pub use self::transport::{Credentials, HttpTransport, Response, Transport};

/// The API version tried first when none is configured.
pub const DEFAULT_API_VERSION: u32 = 3;
/// Root of the versioned API unless a base path is configured.
pub const DEFAULT_VERSIONED_BASE_PATH: &str = "/api";
/// Root of the legacy API unless a base path is configured.
pub const DEFAULT_LEGACY_BASE_PATH: &str = "/status";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors produced by [`StatusClient`]
pub enum Error {
    /// Neither API shape answered during negotiation.
    #[error(
        "Failed to detect the NGINX Plus API type (versioned or legacy) at {host}:{port}, please check your input configuration"
    )]
    Unsupported {
        /// Configured status host
        host: String,
        /// Configured status port
        port: u16,
    },
    /// The server reports a different version than it did at construction.
    #[error("NGINX Plus version changed from {expected} to {actual}, restart to renegotiate")]
    VersionChanged {
        /// Version captured at construction
        expected: String,
        /// Version reported now
        actual: String,
    },
    /// The server did not report a version.
    #[error("NGINX Plus version is unavailable")]
    VersionUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A status sub-resource.
pub enum Resource {
    /// Server metadata (versioned API only)
    Nginx,
    /// Server version string (legacy API only)
    NginxVersion,
    /// Server address string (legacy API only)
    Address,
    /// Client connections
    Connections,
    /// SSL handshakes
    Ssl,
    /// Client requests
    Requests,
    /// HTTP server zones
    ServerZones,
    /// HTTP upstreams
    Upstreams,
    /// Stream server zones
    StreamServerZones,
    /// Stream upstreams
    StreamUpstreams,
    /// Caches
    Caches,
    /// Shared memory zones
    Slabs,
    /// Worker processes
    Processes,
}

/// Where a scalar server property lives for one API shape.
#[derive(Debug, Clone, Copy)]
struct Field {
    resource: Resource,
    /// Path within the resource, or `None` when the resource is the value.
    path: Option<&'static str>,
}

/// Everything that differs between the two API shapes.
#[derive(Debug)]
struct Shape {
    default_base_path: &'static str,
    resources: &'static [(Resource, &'static str)],
    version: Field,
    address: Field,
}

static VERSIONED: Shape = Shape {
    default_base_path: DEFAULT_VERSIONED_BASE_PATH,
    resources: &[
        (Resource::Nginx, "nginx"),
        (Resource::Connections, "connections"),
        (Resource::Ssl, "ssl"),
        (Resource::Requests, "http/requests"),
        (Resource::ServerZones, "http/server_zones"),
        (Resource::Upstreams, "http/upstreams"),
        (Resource::Caches, "http/caches"),
        (Resource::StreamServerZones, "stream/server_zones"),
        (Resource::StreamUpstreams, "stream/upstreams"),
        (Resource::Slabs, "slabs"),
        (Resource::Processes, "processes"),
    ],
    version: Field {
        resource: Resource::Nginx,
        path: Some("version"),
    },
    address: Field {
        resource: Resource::Nginx,
        path: Some("address"),
    },
};

static LEGACY: Shape = Shape {
    default_base_path: DEFAULT_LEGACY_BASE_PATH,
    resources: &[
        (Resource::NginxVersion, "nginx_version"),
        (Resource::Address, "address"),
        (Resource::Connections, "connections"),
        (Resource::Ssl, "ssl"),
        (Resource::Requests, "requests"),
        (Resource::ServerZones, "server_zones"),
        (Resource::Upstreams, "upstreams"),
        (Resource::Caches, "caches"),
        (Resource::StreamServerZones, "stream/server_zones"),
        (Resource::StreamUpstreams, "stream/upstreams"),
        (Resource::Slabs, "slabs"),
        (Resource::Processes, "processes"),
    ],
    version: Field {
        resource: Resource::NginxVersion,
        path: None,
    },
    address: Field {
        resource: Resource::Address,
        path: None,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where and how to reach a status endpoint.
pub struct Endpoint {
    /// Status host name or address
    pub host: String,
    /// Status port
    pub port: u16,
    /// Optional basic auth credentials
    pub credentials: Option<Credentials>,
    /// Fixed API version; `None` negotiates
    pub api_version: Option<NonZeroU32>,
    /// Override of the API root path
    pub api_base_path: Option<String>,
}

/// Client for one NGINX Plus status endpoint.
#[derive(Debug)]
pub struct StatusClient<T> {
    transport: T,
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    api_version: Option<NonZeroU32>,
    base_path: String,
    shape: &'static Shape,
    urls: FxHashMap<Resource, String>,
    version: Option<String>,
}

impl<T: Transport> StatusClient<T> {
    /// Create a new [`StatusClient`], negotiating the API shape.
    ///
    /// When `endpoint.api_version` is set the versioned shape is assumed
    /// without a request. Otherwise `{base}/{DEFAULT_API_VERSION}` is tried
    /// first, `base` defaulting to `/api`, and then `{base}` itself, defaulting
    /// to `/status`. The first 2xx reply decides the shape. The
    /// server version is captured for later drift checks.
    ///
    /// # Errors
    ///
    /// Function will error if neither candidate receives a 2xx reply.
    pub async fn new(transport: T, endpoint: Endpoint) -> Result<Self, Error> {
        let Endpoint {
            host,
            port,
            credentials,
            api_version,
            api_base_path,
        } = endpoint;
        let api_base_path = api_base_path.as_deref().map(normalize_base_path);

        let mut client = Self {
            transport,
            host,
            port,
            credentials,
            api_version: None,
            base_path: String::new(),
            shape: &LEGACY,
            urls: FxHashMap::default(),
            version: None,
        };

        let (shape, api_version) = if api_version.is_some() {
            (&VERSIONED, api_version)
        } else {
            client.negotiate(api_base_path.as_deref()).await?
        };

        client.shape = shape;
        client.api_version = api_version;
        client.base_path = api_base_path.unwrap_or_else(|| shape.default_base_path.to_string());
        client.urls = build_urls(&client.root_url(), shape, api_version);

        client.version = client.get_nginx_version().await;
        match client.version {
            Some(ref version) => info!(
                "NGINX Plus {version} at {host}:{port} speaks the {kind} status API",
                host = client.host,
                port = client.port,
                kind = client.api_kind(),
            ),
            None => warn!(
                "Could not read the NGINX Plus version from {host}:{port}",
                host = client.host,
                port = client.port
            ),
        }
        Ok(client)
    }

    async fn negotiate(
        &self,
        api_base_path: Option<&str>,
    ) -> Result<(&'static Shape, Option<NonZeroU32>), Error> {
        let default_version = NonZeroU32::new(DEFAULT_API_VERSION);

        let versioned = format!(
            "{root}{base}/{DEFAULT_API_VERSION}",
            root = self.server_url(),
            base = api_base_path.unwrap_or(VERSIONED.default_base_path),
        );
        if self.answers(&versioned).await {
            debug!("Versioned status API answered at {versioned}");
            return Ok((&VERSIONED, default_version));
        }

        let legacy = format!(
            "{root}{base}",
            root = self.server_url(),
            base = api_base_path.unwrap_or(LEGACY.default_base_path),
        );
        if self.answers(&legacy).await {
            debug!("Legacy status API answered at {legacy}");
            return Ok((&LEGACY, None));
        }

        error!("Neither {versioned} nor {legacy} answered");
        Err(Error::Unsupported {
            host: self.host.clone(),
            port: self.port,
        })
    }

    async fn answers(&self, url: &str) -> bool {
        match self.transport.get(url, self.credentials.as_ref()).await {
            Ok(response) => response.status.is_success(),
            Err(err) => {
                debug!("Request to {url} failed: {err}");
                false
            }
        }
    }

    fn server_url(&self) -> String {
        format!("http://{host}:{port}", host = self.host, port = self.port)
    }

    fn root_url(&self) -> String {
        format!("{}{}", self.server_url(), self.base_path)
    }

    fn api_kind(&self) -> &'static str {
        if self.api_version.is_some() {
            "versioned"
        } else {
            "legacy"
        }
    }

    /// The negotiated API version, `None` for the legacy API.
    #[must_use]
    pub fn api_version(&self) -> Option<NonZeroU32> {
        self.api_version
    }

    /// The API root path in use.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The configured status host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured status port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The server version captured at construction.
    #[must_use]
    pub fn captured_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// URL of `resource`, or `None` if the negotiated shape lacks it.
    #[must_use]
    pub fn url(&self, resource: Resource) -> Option<&str> {
        self.urls.get(&resource).map(String::as_str)
    }

    /// Fetch and parse `resource`.
    ///
    /// Logs and returns `None` on transport error, non-2xx reply or
    /// a body that is not JSON, and when the resource has no URL in the
    /// negotiated shape.
    pub async fn fetch(&self, resource: Resource) -> Option<Value> {
        let Some(url) = self.urls.get(&resource) else {
            debug!("{resource:?} is not served by the {} API", self.api_kind());
            return None;
        };
        self.send_get(url).await
    }

    async fn send_get(&self, url: &str) -> Option<Value> {
        let response = match self.transport.get(url, self.credentials.as_ref()).await {
            Ok(response) => response,
            Err(err) => {
                error!("Failed to retrieve status from {url}: {err}");
                return None;
            }
        };
        if !response.status.is_success() {
            error!(
                "Unexpected status code: {status}, received when fetching status from {url}",
                status = response.status
            );
            return None;
        }
        match serde_json::from_slice(&response.body) {
            Ok(json) => Some(json),
            Err(err) => {
                error!("Failed to parse status JSON from {url}: {err}");
                None
            }
        }
    }

    async fn lookup(&self, field: Field) -> Option<String> {
        let document = self.fetch(field.resource).await?;
        match field.path {
            Some(p) => path::extract_string(&document, p),
            None => path::render(&document),
        }
    }

    /// Client connection counters.
    pub async fn get_connections(&self) -> Option<Value> {
        self.fetch(Resource::Connections).await
    }

    /// SSL handshake counters.
    pub async fn get_ssl(&self) -> Option<Value> {
        self.fetch(Resource::Ssl).await
    }

    /// Client request counters.
    pub async fn get_requests(&self) -> Option<Value> {
        self.fetch(Resource::Requests).await
    }

    /// HTTP server zones, keyed by zone name.
    pub async fn get_server_zones(&self) -> Option<Value> {
        self.fetch(Resource::ServerZones).await
    }

    /// HTTP upstreams, keyed by upstream name.
    pub async fn get_upstreams(&self) -> Option<Value> {
        self.fetch(Resource::Upstreams).await
    }

    /// Stream server zones, keyed by zone name.
    pub async fn get_stream_server_zones(&self) -> Option<Value> {
        self.fetch(Resource::StreamServerZones).await
    }

    /// Stream upstreams, keyed by upstream name.
    pub async fn get_stream_upstreams(&self) -> Option<Value> {
        self.fetch(Resource::StreamUpstreams).await
    }

    /// Caches, keyed by cache name.
    pub async fn get_caches(&self) -> Option<Value> {
        self.fetch(Resource::Caches).await
    }

    /// Shared memory zones, keyed by zone name.
    pub async fn get_slabs(&self) -> Option<Value> {
        self.fetch(Resource::Slabs).await
    }

    /// Worker process counters.
    pub async fn get_processes(&self) -> Option<Value> {
        self.fetch(Resource::Processes).await
    }

    /// The version string the server reports right now.
    pub async fn get_nginx_version(&self) -> Option<String> {
        self.lookup(self.shape.version).await
    }

    /// The address the server reports right now.
    pub async fn get_nginx_address(&self) -> Option<String> {
        self.lookup(self.shape.address).await
    }

    /// Re-read the server version and compare it against the captured one.
    ///
    /// Returns the live version on a match. If no version was captured at
    /// construction the live one is adopted as the baseline.
    ///
    /// # Errors
    ///
    /// Function will error if the live version is unavailable or differs from
    /// the captured one. Either means the negotiated URLs may be stale.
    pub async fn validate_version(&mut self) -> Result<String, Error> {
        let Some(current) = self.get_nginx_version().await else {
            return Err(Error::VersionUnavailable);
        };
        match self.version {
            Some(ref expected) if *expected != current => Err(Error::VersionChanged {
                expected: expected.clone(),
                actual: current,
            }),
            Some(_) => Ok(current),
            None => {
                info!("Adopting NGINX Plus version {current} as the baseline");
                self.version = Some(current.clone());
                Ok(current)
            }
        }
    }
}

/// Ensure a configured base path starts with `/` and has no trailing `/`.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn build_urls(
    root: &str,
    shape: &Shape,
    api_version: Option<NonZeroU32>,
) -> FxHashMap<Resource, String> {
    let prefix = match api_version {
        Some(version) => format!("{root}/{version}"),
        None => root.to_string(),
    };
    shape
        .resources
        .iter()
        .map(|(resource, sub_path)| (*resource, format!("{prefix}/{sub_path}")))
        .collect()
}
