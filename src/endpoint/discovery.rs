//! Zeroconf discovery records

use super::{resolve, Endpoint, EndpointError, DEFAULT_PORT};

/// Port advertised by the upstream app when the record carries none
pub const DEFAULT_DISCOVERY_PORT: u16 = DEFAULT_PORT;

/// DNS-SD service type suffix of the upstream app
pub const SERVICE_SUFFIX: &str = "._flowhome._tcp.local.";

/// A discovered upstream instance ready for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub endpoint: Endpoint,
    pub name: String,
}

/// Resolve a discovery record into an endpoint plus a display name
pub fn from_discovery(
    host: &str,
    port: Option<u16>,
    service_name: &str,
) -> Result<DiscoveredService, EndpointError> {
    let endpoint = resolve(host, Some(port.unwrap_or(DEFAULT_DISCOVERY_PORT)), None)?;

    let name = service_name
        .strip_suffix(SERVICE_SUFFIX)
        .or_else(|| service_name.strip_suffix(SERVICE_SUFFIX.trim_end_matches('.')))
        .unwrap_or(service_name)
        .trim();

    let name = if name.is_empty() {
        endpoint.host.clone()
    } else {
        name.to_string()
    };

    Ok(DiscoveredService { endpoint, name })
}
