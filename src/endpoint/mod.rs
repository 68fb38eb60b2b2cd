//! Connection-string normalization
//!
//! Turns raw user or discovery input (hostname, optional scheme, optional
//! port, optional explicit SSL flag) into a canonical [`Endpoint`].
//!
//! # Resolution rules
//!
//! - Input is trimmed of whitespace and trailing slashes; empty input is rejected.
//! - A bare hostname is read as `http://<input>`.
//! - A port written in the input always wins over a caller-supplied port,
//!   which in turn wins over the scheme default.
//! - An explicit caller SSL flag wins. Otherwise an explicit scheme decides;
//!   scheme-less input is secure when its port is a secure default or the
//!   host is a well-known hosted instance.
//!
//! # Example
//!
//! ```
//! use flowhome_bridge::endpoint::resolve;
//!
//! let endpoint = resolve("https://x.example:9443", Some(8080), None).unwrap();
//! assert_eq!(endpoint.host, "x.example");
//! assert_eq!(endpoint.port(), 9443);
//! assert!(endpoint.use_ssl);
//! ```

pub mod discovery;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

pub use discovery::{from_discovery, DiscoveredService, DEFAULT_DISCOVERY_PORT};

/// Scheme assumed for input without `://`
pub const DEFAULT_SCHEME: &str = "http";

/// Port the upstream app listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 8080;

/// Conventional port for plain HTTP
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Conventional port for HTTPS
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Ports that imply TLS when no scheme was given
pub const SECURE_PORTS: &[u16] = &[443, 8443];

/// Hosted instances that only speak TLS
pub const WELL_KNOWN_SECURE_HOSTS: &[&str] = &["api.flowhome.app", "cloud.flowhome.app"];

/// Path prefix of the upstream REST surface
pub const API_PATH: &str = "/api";

/// Errors produced while resolving connection input
///
/// Every variant is an `InvalidEndpoint` condition: fatal at configuration
/// time and surfaced to the user as a validation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Nothing left after trimming
    #[error("host must not be empty")]
    Empty,

    /// The input parsed but carried no hostname
    #[error("no hostname in '{0}'")]
    MissingHost(String),

    /// Only http and https are served by the upstream app
    #[error("unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    /// The input is not a valid URL
    #[error("cannot parse '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// Canonical (host, port, secure-transport flag) triple used to reach the upstream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Lowercase hostname or IP literal (IPv6 kept in brackets)
    pub host: String,

    /// Non-default port, `None` when the scheme default applies
    pub port: Option<u16>,

    /// Whether to use TLS
    pub use_ssl: bool,
}

impl Endpoint {
    /// Build an endpoint, folding a scheme-default port into `None`
    pub fn new(host: impl Into<String>, port: u16, use_ssl: bool) -> Self {
        let port = (port != default_port(use_ssl)).then_some(port);
        Self {
            host: host.into(),
            port,
            use_ssl,
        }
    }

    /// Effective port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| default_port(self.use_ssl))
    }

    /// `http` or `https`
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Canonical base URL; the port is omitted when it is the scheme default
    #[must_use]
    pub fn canonical_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.scheme(), self.host),
            None => format!("{}://{}", self.scheme(), self.host),
        }
    }

    /// Base URL of the REST surface (`<canonical>/api`)
    #[must_use]
    pub fn api_base_url(&self) -> String {
        format!("{}{API_PATH}", self.canonical_url())
    }

    /// Identifier used to detect an already-configured upstream
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_url())
    }
}

/// Default port for the given transport
#[must_use]
pub fn default_port(use_ssl: bool) -> u16 {
    if use_ssl {
        DEFAULT_HTTPS_PORT
    } else {
        DEFAULT_HTTP_PORT
    }
}

/// Resolve raw connection input into a canonical [`Endpoint`]
///
/// # Arguments
///
/// * `raw_host` - hostname, `host:port`, or a full `http(s)://` URL
/// * `requested_port` - caller default, ignored when `None` or zero
/// * `requested_use_ssl` - explicit TLS flag, overrides all inference
///
/// # Errors
///
/// Returns an [`EndpointError`] when the input is empty, unparseable, uses a
/// scheme other than http/https, or has no hostname.
pub fn resolve(
    raw_host: &str,
    requested_port: Option<u16>,
    requested_use_ssl: Option<bool>,
) -> Result<Endpoint, EndpointError> {
    let input = raw_host.trim();

    // Slashes are only stripped after the scheme separator, so `https://`
    // keeps its scheme and fails for lack of a host.
    let (explicit_scheme, rest) = match input.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, input),
    };
    let rest = rest.trim_end_matches('/').trim_end();
    let has_scheme = explicit_scheme.is_some();

    if rest.is_empty() {
        return Err(if has_scheme {
            EndpointError::MissingHost(input.to_string())
        } else {
            EndpointError::Empty
        });
    }

    let candidate = format!("{}://{rest}", explicit_scheme.unwrap_or(DEFAULT_SCHEME));

    let parsed = Url::parse(&candidate).map_err(|e| match e {
        url::ParseError::EmptyHost => EndpointError::MissingHost(input.to_string()),
        other => EndpointError::Malformed {
            input: input.to_string(),
            reason: other.to_string(),
        },
    })?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(EndpointError::UnsupportedScheme(scheme.to_string()));
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| EndpointError::MissingHost(input.to_string()))?
        .to_ascii_lowercase();

    // Url::port() hides a port equal to the scheme default, so look at the
    // authority text as well.
    let embedded_port = parsed
        .port()
        .or_else(|| authority_port(&candidate))
        .filter(|p| *p != 0);
    let requested_port = requested_port.filter(|p| *p != 0);
    let explicit_port = embedded_port.or(requested_port);

    let use_ssl = match requested_use_ssl {
        Some(flag) => flag,
        None if has_scheme => scheme == "https",
        None => match explicit_port {
            Some(port) => SECURE_PORTS.contains(&port),
            None => WELL_KNOWN_SECURE_HOSTS.contains(&host.as_str()),
        },
    };

    let port = explicit_port.unwrap_or_else(|| default_port(use_ssl));

    Ok(Endpoint::new(host, port, use_ssl))
}

/// Port written in the authority of `url`, if any
fn authority_port(url: &str) -> Option<u16> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    if host_port.ends_with(']') {
        return None;
    }

    host_port
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
}
