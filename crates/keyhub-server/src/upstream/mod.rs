//! Clients for the two APIs every managed server exposes.
//!
//! The primary (access-key) API lives at the configured URL, typically
//! `https://host:port/<secret>`. The status companion listens on the same
//! host at `port + 1`, speaks plain HTTP and shares the secret path.

pub mod access_keys;
pub mod status;

use std::time::Duration;

use reqwest::Url;

use crate::error::{Error, Result};

pub use access_keys::AccessKeyClient;
pub use status::StatusClient;

/// Options for the shared upstream HTTP client.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Skip peer certificate validation (access-key servers use self-signed certs).
    pub accept_invalid_certs: bool,
    /// Per-request timeout; `None` leaves the transport default.
    pub timeout: Option<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            timeout: None,
        }
    }
}

/// Build the single client shared by every upstream call.
pub fn build_client(opts: &TransportOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(opts.accept_invalid_certs);
    if let Some(timeout) = opts.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Error::from)
}

/// API roots for one managed server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: String,
    pub status: String,
}

impl Endpoints {
    /// Derive both roots from the configured access-key API URL.
    pub fn derive(primary: &str) -> Result<Self> {
        let primary = primary.trim().trim_end_matches('/').to_owned();
        let mut url = Url::parse(&primary)
            .map_err(|e| Error::Configuration(format!("invalid server url {primary:?}: {e}")))?;

        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Configuration(format!("server url {primary:?} has no port")))?;
        let status_port = port
            .checked_add(1)
            .ok_or_else(|| Error::Configuration(format!("server url {primary:?}: port {port} has no successor")))?;

        url.set_scheme("http")
            .map_err(|_| Error::Configuration(format!("server url {primary:?} cannot switch to http")))?;
        url.set_port(Some(status_port))
            .map_err(|_| Error::Configuration(format!("server url {primary:?} cannot carry a port")))?;

        let status = url.as_str().trim_end_matches('/').to_owned();
        Ok(Self { primary, status })
    }

    /// Use explicit roots instead of deriving the status root.
    pub fn from_parts(primary: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            primary: primary.into().trim_end_matches('/').to_owned(),
            status: status.into().trim_end_matches('/').to_owned(),
        }
    }
}

/// Fail with [`Error::Upstream`] unless the response carries `expected`.
pub(crate) fn expect_status(resp: &reqwest::Response, expected: reqwest::StatusCode) -> Result<()> {
    if resp.status() == expected {
        Ok(())
    } else {
        Err(Error::upstream_status(resp.status()))
    }
}
