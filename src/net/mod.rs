//! Addresses at which this host can be reached.
//!
//! The host name always comes first when it can be determined. After it
//! come either the local interface addresses or, in public mode, the
//! addresses reported by external lookup endpoints. Callers must not rely on
//! the order beyond display grouping.

mod local;
mod public;

pub use local::{LocalInterfaces, is_shareable};
pub use public::{DEFAULT_ENDPOINTS, PublicIpLookup};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

/// A source of reachable addresses, rendered as URL hosts.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn addresses(&self) -> Result<Vec<String>>;
}

/// Host name followed by every address `source` reports.
///
/// A host name failure is logged and skipped; a failing source is fatal.
pub async fn list_addresses_from(source: &dyn AddressSource) -> Result<Vec<String>> {
    let mut addresses = Vec::new();
    match hostname::get() {
        Ok(name) => addresses.push(name.to_string_lossy().into_owned()),
        Err(e) => warn!("failed to get hostname: {}", e),
    }

    addresses.extend(source.addresses().await?);
    debug!("reachable addresses: {:?}", addresses);
    Ok(addresses)
}

/// Enumerate addresses using local interfaces, or public lookups when
/// `public_only` is set.
///
/// # Returns
///
/// The host name (when known) followed by address literals, ready for
/// [`compose_resources`](crate::compose_resources).
///
/// # Errors
///
/// [`Error::AddressDiscovery`](crate::Error::AddressDiscovery) when the
/// chosen source fails.
pub async fn list_addresses(public_only: bool) -> Result<Vec<String>> {
    if public_only {
        let lookup = PublicIpLookup::new()?;
        list_addresses_from(&lookup).await
    } else {
        list_addresses_from(&LocalInterfaces).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl AddressSource for Fixed {
        async fn addresses(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl AddressSource for Failing {
        async fn addresses(&self) -> Result<Vec<String>> {
            Err(Error::AddressDiscovery {
                endpoint: "test".to_string(),
                reason: "unreachable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn source_addresses_follow_hostname() {
        let addresses = list_addresses_from(&Fixed(vec!["192.168.1.10", "fd00::1"]))
            .await
            .unwrap();
        assert!(addresses.ends_with(&["192.168.1.10".to_string(), "fd00::1".to_string()]));
        if let Ok(name) = hostname::get() {
            assert_eq!(addresses[0], name.to_string_lossy());
        }
    }

    #[tokio::test]
    async fn failing_source_is_fatal() {
        let err = list_addresses_from(&Failing).await.unwrap_err();
        assert!(matches!(err, Error::AddressDiscovery { .. }));
    }
}
