//! HTTP transport abstraction.
//!
//! The engine never talks to the network directly; it hands the fully built
//! request to an injectable transport. The default transport is a shared
//! `reqwest` client, but tests (or callers with special needs) can observe
//! the final request and return a synthetic response instead.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};

/// Send one HTTP request and return its response.
///
/// Implementations may be shared across many concurrent calls; the engine
/// never mutates a transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        self.execute(request).await.map_err(Error::from)
    }
}

/// Process-wide default client, used when no client override is configured.
pub(crate) static DEFAULT_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

pub(crate) fn default_client() -> reqwest::Client {
    DEFAULT_CLIENT.clone()
}
