use std::net::IpAddr;

use async_trait::async_trait;
use pnet::datalink;

use super::AddressSource;
use crate::error::Result;

/// Addresses bound to local network interfaces.
pub struct LocalInterfaces;

#[async_trait]
impl AddressSource for LocalInterfaces {
    async fn addresses(&self) -> Result<Vec<String>> {
        let addresses = datalink::interfaces()
            .into_iter()
            .flat_map(|iface| iface.ips)
            .map(|network| network.ip())
            .filter(is_shareable)
            .map(|ip| ip.to_string())
            .collect();
        Ok(addresses)
    }
}

/// Whether another host could plausibly reach us at `ip`.
///
/// Rejects loopback, unspecified, link-local unicast and link-local
/// multicast addresses.
pub fn is_shareable(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            // 224.0.0.0/24
            let link_local_multicast = octets[0] == 224 && octets[1] == 0 && octets[2] == 0;
            !v4.is_link_local() && !link_local_multicast
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fe80::/10
            let link_local_unicast = first & 0xffc0 == 0xfe80;
            // ff02::/16 and other link-scoped multicast
            let link_local_multicast = first & 0xff0f == 0xff02;
            !link_local_unicast && !link_local_multicast
        }
    }
}
