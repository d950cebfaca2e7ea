use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::net::TcpListener;
use std::time::Duration;
use testenv_common::{HarnessError, PortRange};
use testenv_server::config::AllocatorConfig;
use testenv_server::ports::{
    allocate_port, find_free_port, find_free_port_with_rng, is_port_in_use, localhost_random_port,
    random_port_address,
};

const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

// --- find_free_port with a fake probe ---

#[test]
fn test_all_ports_occupied_exhausts_attempts() {
    let mut probes = 0;
    let result = find_free_port(PortRange::DEFAULT, 100, |_| {
        probes += 1;
        true
    });

    assert!(matches!(
        result,
        Err(HarnessError::NoFreePortAvailable { attempts: 100, min: 8081, max: 8999 })
    ));
    assert_eq!(probes, 100, "every attempt must probe exactly once");
}

#[test]
fn test_returns_first_free_candidate() {
    let mut probed = Vec::new();
    let port = find_free_port(PortRange::DEFAULT, 100, |candidate| {
        probed.push(candidate);
        probed.len() < 4
    })
    .unwrap();

    assert_eq!(probed.len(), 4);
    assert_eq!(port, *probed.last().unwrap());
}

#[test]
fn test_free_port_lies_within_range() {
    let range = PortRange::new(9000, 9009).unwrap();
    for _ in 0..500 {
        let port = find_free_port(range, 100, |_| false).unwrap();
        assert!(range.contains(port), "port {port} outside {range}");
    }
}

#[test]
fn test_candidates_cover_the_range() {
    let range = PortRange::new(9000, 9004).unwrap();
    let mut seen = HashSet::new();
    let mut rng = StdRng::seed_from_u64(7);
    // Occupied forever, so every draw is recorded
    let _ = find_free_port_with_rng(range, 200, &mut rng, |candidate| {
        seen.insert(candidate);
        true
    });
    assert_eq!(seen, (9000..=9004).collect::<HashSet<u16>>());
}

#[test]
fn test_same_seed_same_port() {
    let range = PortRange::DEFAULT;
    let a = find_free_port_with_rng(range, 100, &mut StdRng::seed_from_u64(42), |_| false).unwrap();
    let b = find_free_port_with_rng(range, 100, &mut StdRng::seed_from_u64(42), |_| false).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_single_port_range() {
    let range = PortRange::new(9123, 9123).unwrap();
    assert_eq!(find_free_port(range, 1, |_| false).unwrap(), 9123);
    assert!(matches!(
        find_free_port(range, 3, |_| true),
        Err(HarnessError::NoFreePortAvailable { attempts: 3, min: 9123, max: 9123 })
    ));
}

#[test]
fn test_zero_attempts_never_probes() {
    let mut probes = 0;
    let result = find_free_port(PortRange::DEFAULT, 0, |_| {
        probes += 1;
        false
    });
    assert!(matches!(result, Err(HarnessError::NoFreePortAvailable { attempts: 0, .. })));
    assert_eq!(probes, 0);
}

// --- network probe ---

#[test]
fn test_is_port_in_use_detects_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    assert!(is_port_in_use("127.0.0.1", port, PROBE_TIMEOUT));

    drop(listener);
    assert!(!is_port_in_use("127.0.0.1", port, PROBE_TIMEOUT));
}

#[test]
fn test_is_port_in_use_unresolvable_host_counts_as_free() {
    assert!(!is_port_in_use("no-such-host.invalid", 8081, PROBE_TIMEOUT));
}

#[test]
fn test_allocate_port_is_observably_free() {
    let config = AllocatorConfig::default();
    let port = allocate_port(&config).unwrap();

    assert!(config.range.contains(port));
    assert!(!is_port_in_use("localhost", port, PROBE_TIMEOUT));
    // Nothing else claimed it in the meantime, so we can bind it ourselves
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[test]
fn test_allocate_port_gives_up_when_range_is_held() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = AllocatorConfig {
        range: PortRange::new(port, port).unwrap(),
        max_attempts: 3,
        probe_timeout_ms: 1000,
        host: "127.0.0.1".to_string(),
    };

    assert!(matches!(
        allocate_port(&config),
        Err(HarnessError::NoFreePortAvailable { attempts: 3, .. })
    ));
}

#[test]
fn test_random_port_address_uses_config_host() {
    let config = AllocatorConfig { host: "127.0.0.1".to_string(), ..AllocatorConfig::default() };
    let base = random_port_address(&config).unwrap();
    assert_eq!(base.host(), "127.0.0.1");
    assert_eq!(base.scheme(), "http");
    assert!(config.range.contains(base.port()));
}

#[test]
fn test_localhost_random_port() {
    let base = localhost_random_port().unwrap();
    assert_eq!(base.host(), "localhost");
    assert!(AllocatorConfig::from_env().unwrap().range.contains(base.port()));
    assert_eq!(base.to_string(), format!("http://localhost:{}", base.port()));
}
