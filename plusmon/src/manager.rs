//! Fan-out over several configured agents.
//!
//! Every configuration block yields one independent [`Agent`]. The manager
//! reads them in configuration order and keeps going when one of them fails.

use tracing::{debug, error};

use crate::{
    agent::{self, Agent},
    client::{HttpTransport, Transport},
    options::ConfigNode,
    sink::Sink,
};

/// The set of agents driven by one host.
#[derive(Debug)]
pub struct Manager<T = HttpTransport> {
    agents: Vec<Agent<T>>,
}

impl<T> Default for Manager<T> {
    fn default() -> Self {
        Self { agents: Vec::new() }
    }
}

impl<T> Manager<T> {
    /// Create an empty [`Manager`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of configured agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent has been configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Append an already configured agent.
    pub fn push(&mut self, agent: Agent<T>) {
        self.agents.push(agent);
    }
}

impl Manager<HttpTransport> {
    /// Configure a new agent from `nodes` and append it.
    ///
    /// # Errors
    ///
    /// Function will error if the agent cannot be configured; no agent is
    /// added in that case.
    pub async fn configure(&mut self, nodes: &[ConfigNode]) -> Result<(), agent::Error> {
        let agent = Agent::configure(nodes).await?;
        self.agents.push(agent);
        debug!("Configured agent {}", self.agents.len());
        Ok(())
    }
}

impl<T: Transport> Manager<T> {
    /// Read every agent into `sink`, in configuration order.
    ///
    /// An agent that fails is logged and skipped. Returns the total number of
    /// records emitted.
    pub async fn read<S: Sink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut emitted = 0;
        for (index, agent) in self.agents.iter_mut().enumerate() {
            match agent.read(sink).await {
                Ok(count) => emitted += count,
                Err(err) => error!("Read of agent {index} failed: {err}"),
            }
        }
        emitted
    }
}
