//! HTTP transport used by [`super::StatusClient`].
//!
//! The client only ever issues plain GET requests, optionally with basic auth,
//! and inspects the status code and body of the reply. [`Transport`] captures
//! exactly that so the client can be exercised without a network.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use http::StatusCode;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced by a [`Transport`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper for [`reqwest::Error`].
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The transport could not complete the request for another reason.
    #[error("Request to {0} failed")]
    Unavailable(String),
}

/// Basic auth credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Basic auth user name
    pub username: String,
    /// Basic auth password, if any
    pub password: Option<String>,
}

/// The status line and body of a completed request.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: StatusCode,
    /// Raw response body
    pub body: Bytes,
}

/// A means of performing GET requests.
pub trait Transport {
    /// GET `url`, attaching `credentials` as basic auth when present.
    ///
    /// Non-2xx replies are not errors at this level; they are returned as a
    /// [`Response`] for the caller to judge.
    fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> impl Future<Output = Result<Response, Error>> + Send;
}

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new [`HttpTransport`] whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response, Error> {
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, creds.password.as_ref());
        }
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Ok(Response { status, body })
    }
}
