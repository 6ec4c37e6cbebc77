//! Per-request TLS policy for network transports.
//!
//! When certificate verification is disabled the relaxed client must only be
//! used for `https` targets; plain `http` requests keep the default client.
//! The choice is made for every request from the request's own URL, so a
//! transport that is redirected to another endpoint still gets the right one.

use crate::error::TransportError;
use crate::transport::TimeoutConfig;
use log::debug;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use url::Url;

/// Which client a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSelection {
    Default,
    /// Accepts any server certificate.
    Unverified,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    default: Client,
    unverified: Option<Client>,
}

impl Fetcher {
    /// A fetcher with only the default, verifying client.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        Ok(Self {
            default: base_builder(timeouts).build()?,
            unverified: None,
        })
    }

    /// A fetcher that skips certificate verification for `https` targets.
    pub fn with_unverified_tls(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let unverified = base_builder(timeouts)
            .danger_accept_invalid_certs(true)
            .build()?;
        debug!("TLS certificate verification disabled for https targets");
        Ok(Self {
            default: base_builder(timeouts).build()?,
            unverified: Some(unverified),
        })
    }

    pub fn has_override(&self) -> bool {
        self.unverified.is_some()
    }

    pub fn select(&self, url: &Url) -> AgentSelection {
        if self.unverified.is_some() && url.scheme() == "https" {
            AgentSelection::Unverified
        } else {
            AgentSelection::Default
        }
    }

    pub fn client_for(&self, url: &Url) -> &Client {
        match (self.select(url), &self.unverified) {
            (AgentSelection::Unverified, Some(client)) => client,
            _ => &self.default,
        }
    }

    pub fn get(&self, url: &Url) -> RequestBuilder {
        self.client_for(url).get(url.clone())
    }

    pub fn post(&self, url: &Url) -> RequestBuilder {
        self.client_for(url).post(url.clone())
    }
}

// No overall request timeout here: the SSE stream is a long-lived GET.
fn base_builder(timeouts: &TimeoutConfig) -> reqwest::ClientBuilder {
    Client::builder().connect_timeout(Duration::from_millis(timeouts.connect_timeout_ms))
}
