use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::AddressSource;
use crate::error::{Error, Result};

/// IPv4 and IPv6 "what is my address" endpoints, queried in order.
pub const DEFAULT_ENDPOINTS: [&str; 2] = ["https://api-ipv4.ip.sb/ip", "https://api-ipv6.ip.sb/ip"];

/// Some lookup services refuse requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla";

/// Public addresses reported by external lookup endpoints.
///
/// Each endpoint answers a plain GET with the caller's address as the body.
/// Any failing endpoint fails the whole lookup.
pub struct PublicIpLookup {
    client: Client,
    endpoints: Vec<String>,
}

impl PublicIpLookup {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_endpoints(endpoints: Vec<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::AddressDiscovery {
                endpoint: "<client>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, endpoints })
    }

    async fn fetch(&self, endpoint: &str) -> std::result::Result<String, reqwest::Error> {
        let body = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl AddressSource for PublicIpLookup {
    async fn addresses(&self) -> Result<Vec<String>> {
        let mut addresses = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let address = self
                .fetch(endpoint)
                .await
                .map_err(|e| Error::AddressDiscovery {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;
            debug!("{} reported {}", endpoint, address);
            addresses.push(address);
        }
        Ok(addresses)
    }
}
