use crate::{HarnessError, Result, LOCALHOST};
use std::fmt;
use url::Url;

/// Where a test server lives: `scheme://host:port[/prefix]`.
///
/// Immutable once built. Request URLs are derived from it with [`BaseAddress::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAddress {
    scheme: String,
    host: String,
    port: u16,
    /// Always starts with `/` and never ends with one.
    path_prefix: Option<String>,
}

impl BaseAddress {
    pub fn new(scheme: &str, host: &str, port: u16, path_prefix: Option<&str>) -> Result<Self> {
        if scheme.is_empty() {
            return Err(HarnessError::InvalidBaseAddress("scheme is empty".to_string()));
        }
        if host.is_empty() {
            return Err(HarnessError::InvalidBaseAddress("host is empty".to_string()));
        }
        if port == 0 {
            return Err(HarnessError::InvalidBaseAddress("port must be non-zero".to_string()));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path_prefix: path_prefix.and_then(normalize_prefix),
        })
    }

    /// `http://localhost:<port>` with no path prefix.
    pub fn localhost(port: u16) -> Result<Self> {
        Self::new("http", LOCALHOST, port, None)
    }

    /// Parse a URL such as `http://localhost:8090/test`.
    /// A missing port falls back to the scheme's well-known default.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| HarnessError::InvalidBaseAddress(format!("{input}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| HarnessError::InvalidBaseAddress(format!("{input}: missing host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HarnessError::InvalidBaseAddress(format!("{input}: missing port")))?;
        Self::new(url.scheme(), host, port, Some(url.path()))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host in the form socket APIs accept (IPv6 literals without brackets).
    pub fn socket_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    /// Append `path` to this address with exactly one `/` at the join.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self, path.trim_start_matches('/'))
    }
}

impl fmt::Display for BaseAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some(prefix) = &self.path_prefix {
            f.write_str(prefix)?;
        }
        Ok(())
    }
}

fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
