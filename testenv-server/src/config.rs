use serde::Deserialize;
use std::env::{self, VarError};
use std::path::Path;
use std::time::Duration;
use testenv_common::{HarnessError, PortRange, Result, LOCALHOST, MAX_PROBE_ATTEMPTS, PROBE_TIMEOUT_MS};

/// Environment variable overriding the allocator's port range, formatted `min-max`.
pub const PORT_RANGE_ENV: &str = "TESTENV_PORT_RANGE";

/// Port allocator settings.
///
/// Every field is optional in JSON; missing fields take the defaults below.
///
/// ```json
/// { "range": [9000, 9100], "max_attempts": 50, "probe_timeout_ms": 500, "host": "127.0.0.1" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
    pub range: PortRange,
    pub max_attempts: u32,
    pub probe_timeout_ms: u64,
    /// Host that candidate ports are probed on.
    pub host: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            range: PortRange::DEFAULT,
            max_attempts: MAX_PROBE_ATTEMPTS,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            host: LOCALHOST.to_string(),
        }
    }
}

impl AllocatorConfig {
    pub fn with_range(mut self, range: PortRange) -> Self {
        self.range = range;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| HarnessError::Config(format!("malformed allocator config: {e}")))?;
        config.validate()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Defaults, with the range taken from `TESTENV_PORT_RANGE` when set.
    pub fn from_env() -> Result<Self> {
        match env::var(PORT_RANGE_ENV) {
            Ok(value) => Self::default().with_range_override(Some(value.as_str())),
            Err(VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(HarnessError::Config(format!("{PORT_RANGE_ENV}: {e}"))),
        }
    }

    /// Replace the range with `value` parsed as `min-max`; `None` keeps the current one.
    pub fn with_range_override(self, value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(self),
            Some(raw) => Ok(self.with_range(raw.parse()?)),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.max_attempts == 0 {
            return Err(HarnessError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(HarnessError::Config("probe_timeout_ms must be at least 1".to_string()));
        }
        if self.host.is_empty() {
            return Err(HarnessError::Config("host must not be empty".to_string()));
        }
        Ok(self)
    }
}
