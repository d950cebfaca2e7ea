use crate::config::AllocatorConfig;
use rand::Rng;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use testenv_common::{BaseAddress, HarnessError, PortRange, Result};
use tracing::{debug, info};

/// Draw up to `max_attempts` candidates uniformly at random from `range` and
/// return the first one `probe` reports as unoccupied.
///
/// `probe(port)` returns `true` when the port is in use. Draws are
/// independent, so a candidate may repeat.
pub fn find_free_port<P>(range: PortRange, max_attempts: u32, probe: P) -> Result<u16>
where
    P: FnMut(u16) -> bool,
{
    find_free_port_with_rng(range, max_attempts, &mut rand::thread_rng(), probe)
}

/// [`find_free_port`] with an explicit random source.
pub fn find_free_port_with_rng<R, P>(range: PortRange, max_attempts: u32, rng: &mut R, mut probe: P) -> Result<u16>
where
    R: Rng,
    P: FnMut(u16) -> bool,
{
    for attempt in 1..=max_attempts {
        let candidate = rng.gen_range(range.min()..=range.max());
        if !probe(candidate) {
            debug!(port = candidate, attempt, "Port is free");
            return Ok(candidate);
        }
        debug!(port = candidate, attempt, "Port is in use");
    }
    Err(HarnessError::NoFreePortAvailable { attempts: max_attempts, min: range.min(), max: range.max() })
}

/// Returns `true` if something accepts TCP connections on `host:port`.
///
/// Every address `host` resolves to is tried with `timeout`. Refused
/// connections, timeouts and resolution failures all count as free.
pub fn is_port_in_use(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!(host, port, error = %e, "Cannot resolve probe host");
            return false;
        }
    };
    addrs.into_iter().any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}

/// Find a free port by probing `config.host` over the network.
///
/// The port is only observed free; nothing holds it until the caller binds,
/// so another process can still take it in between.
pub fn allocate_port(config: &AllocatorConfig) -> Result<u16> {
    let timeout = config.probe_timeout();
    let port = find_free_port(config.range, config.max_attempts, |candidate| {
        is_port_in_use(&config.host, candidate, timeout)
    })?;
    info!(port, range = %config.range, "Allocated free port");
    Ok(port)
}

/// `http://<config.host>:<free port>`
pub fn random_port_address(config: &AllocatorConfig) -> Result<BaseAddress> {
    BaseAddress::new("http", &config.host, allocate_port(config)?, None)
}

/// `http://localhost:<free port>` from the default range, or from
/// `TESTENV_PORT_RANGE` when that is set.
pub fn localhost_random_port() -> Result<BaseAddress> {
    random_port_address(&AllocatorConfig::from_env()?)
}
