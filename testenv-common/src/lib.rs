use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod address;
pub use address::BaseAddress;

/// Lowest port handed out by the allocator unless overridden.
pub const DEFAULT_MIN_PORT: u16 = 8081;
/// Highest port handed out by the allocator unless overridden (inclusive).
pub const DEFAULT_MAX_PORT: u16 = 8999;
/// Number of candidates probed before giving up.
pub const MAX_PROBE_ATTEMPTS: u32 = 100;
/// Connect and read timeout for a single port probe, in milliseconds.
pub const PROBE_TIMEOUT_MS: u64 = 1_000;
/// Host that ports are probed on and that default base addresses point at.
pub const LOCALHOST: &str = "localhost";

/// Error types for test environment operations
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("No free port in range {min}-{max} after {attempts} attempts")]
    NoFreePortAvailable { attempts: u32, min: u16, max: u16 },

    #[error("Failed to start server on port {port}: {source}")]
    ServerStartFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop server: {0}")]
    ServerStopFailed(String),

    #[error("Server already running on port {0}")]
    AlreadyRunning(u16),

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    #[error("Handler registered twice: {0}")]
    DuplicateHandler(String),

    #[error("Handler {0} declares a route another selected handler already serves")]
    RouteConflict(String),

    #[error("Invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    #[error("Invalid base address: {0}")]
    InvalidBaseAddress(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for test environment operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Inclusive range of TCP ports the allocator may choose from.
///
/// Serialized as a `[min, max]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u16, u16)", into = "(u16, u16)")]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub const DEFAULT: PortRange = PortRange { min: DEFAULT_MIN_PORT, max: DEFAULT_MAX_PORT };

    /// Create a range, rejecting `min > max` and port 0.
    pub fn new(min: u16, max: u16) -> Result<Self> {
        if min == 0 || min > max {
            return Err(HarnessError::InvalidPortRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Number of candidate ports in the range; never zero.
    pub fn size(&self) -> u32 {
        u32::from(self.max) - u32::from(self.min) + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<(u16, u16)> for PortRange {
    type Error = HarnessError;

    fn try_from((min, max): (u16, u16)) -> Result<Self> {
        Self::new(min, max)
    }
}

impl From<PortRange> for (u16, u16) {
    fn from(range: PortRange) -> Self {
        (range.min, range.max)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Parses the `min-max` form used by `TESTENV_PORT_RANGE`.
impl FromStr for PortRange {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let (min, max) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| HarnessError::Config(format!("port range must look like min-max, got {s:?}")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|e| HarnessError::Config(format!("invalid port {part:?} in range {s:?}: {e}")))
        };
        Self::new(parse(min)?, parse(max)?)
    }
}
