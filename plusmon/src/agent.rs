//! Orchestration of one polled NGINX Plus server.
//!
//! An [`Agent`] is created by [`Agent::configure`], which parses the option
//! block, registers the metric emitters and negotiates the status API. Each
//! subsequent [`Agent::read`] drives one poll-and-emit cycle into the supplied
//! sink. The host decides when to call `read`; the agent never schedules work
//! of its own.

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    client::{self, HttpTransport, Resource, StatusClient, Transport},
    dimension::DimensionSet,
    emitter::{DEFAULT_EMITTERS, Emitter, Scope},
    options::{self, ConfigNode, Settings},
    sink::Sink,
};

/// Global dimension carrying the live server version.
pub const VERSION_DIMENSION: &str = "nginx.version";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors produced by [`Agent`]
pub enum Error {
    /// The option block is malformed.
    #[error("Invalid configuration: {0}")]
    Options(#[from] options::Error),
    /// Negotiation failed or the server changed underneath us.
    #[error(transparent)]
    Client(#[from] client::Error),
}

/// Poller for a single NGINX Plus server.
#[derive(Debug)]
pub struct Agent<T = HttpTransport> {
    client: StatusClient<T>,
    emitters: Vec<Emitter>,
    operator_dimensions: DimensionSet,
    global_dimensions: DimensionSet,
    instance_id: Option<String>,
}

impl Agent<HttpTransport> {
    /// Create a new [`Agent`] from an option block, talking HTTP.
    ///
    /// # Errors
    ///
    /// Function will error if the options are malformed or the status API
    /// cannot be negotiated.
    pub async fn configure(nodes: &[ConfigNode]) -> Result<Self, Error> {
        let settings = Settings::from_nodes(nodes)?;
        let transport = HttpTransport::new(settings.timeout);
        Self::with_transport(&settings, transport).await
    }
}

impl<T: Transport> Agent<T> {
    /// Create a new [`Agent`] from parsed settings over `transport`.
    ///
    /// Default emitters are registered first, then each enabled opt-in group.
    ///
    /// # Errors
    ///
    /// Function will error if the status API cannot be negotiated.
    pub async fn with_transport(settings: &Settings, transport: T) -> Result<Self, Error> {
        info!("Starting configuration for {}:{}", settings.host, settings.port);

        let mut emitters: Vec<Emitter> = DEFAULT_EMITTERS.to_vec();
        for emitter in settings.groups.emitters() {
            debug!("{} enabled, adding emitter", emitter.name());
            emitters.push(emitter);
        }

        let client = StatusClient::new(transport, settings.endpoint()).await?;

        debug!(
            "Finished configuration. Reading status from {}:{}",
            settings.host, settings.port
        );
        Ok(Self {
            client,
            emitters,
            operator_dimensions: settings.dimensions.clone(),
            global_dimensions: settings.dimensions.clone(),
            instance_id: None,
        })
    }

    /// The identity of the polled server, `address:port`.
    ///
    /// Resolved from the server's reported address on first use and cached.
    /// Returns `None`, without caching, while the address is unavailable.
    pub async fn instance_id(&mut self) -> Option<&str> {
        if self.instance_id.is_none() {
            let address = self.client.get_nginx_address().await?;
            let instance_id = format!("{address}:{port}", port = self.client.port());
            debug!("Resolved instance id {instance_id}");
            self.instance_id = Some(instance_id);
        }
        self.instance_id.as_deref()
    }

    /// Forget the cached instance id; the next read resolves it again.
    pub fn reset_instance_id(&mut self) {
        self.instance_id = None;
    }

    /// Run one poll-and-emit cycle into `sink`.
    ///
    /// Each resource is fetched at most once per cycle however many emitters
    /// read it. A resource that cannot be fetched skips only the emitters that
    /// need it. Returns the number of records emitted.
    ///
    /// # Errors
    ///
    /// Function will error if the server version has changed or cannot be
    /// read. Records emitted before the error are not retracted.
    pub async fn read<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<usize, Error> {
        debug!("Starting read");

        let Some(instance_id) = self.instance_id().await.map(str::to_string) else {
            warn!("Skipping read, instance id is not set");
            return Ok(0);
        };

        let version = self.client.validate_version().await?;
        self.global_dimensions = self.operator_dimensions.clone();
        self.global_dimensions.insert(VERSION_DIMENSION, version);

        let scope = Scope {
            instance_id: &instance_id,
            global_dimensions: &self.global_dimensions,
        };
        let mut documents: FxHashMap<Resource, Option<Value>> = FxHashMap::default();
        let mut emitted = 0;
        for emitter in &self.emitters {
            let resource = emitter.resource();
            if !documents.contains_key(&resource) {
                let document = self.client.fetch(resource).await;
                documents.insert(resource, document);
            }
            let Some(Some(document)) = documents.get(&resource) else {
                debug!("No {resource:?} status this cycle, skipping {}", emitter.name());
                continue;
            };
            emitted += emitter.emit(document, scope, sink);
        }
        debug!("Read complete, emitted {emitted} records for {instance_id}");
        Ok(emitted)
    }
}
