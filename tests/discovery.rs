//! Discovery tests - the sweep must finish inside its deadline and never
//! surface probe failures.

use std::time::{Duration, Instant};

use spalink::config::DiscoveryConfig;
use spalink::discovery;

#[tokio::test]
async fn test_discover_finishes_within_deadline() {
    // Nothing on the local subnets listens on this port; every probe is a
    // refusal or a timeout, and none of them may fail the scan.
    let config = DiscoveryConfig {
        port: 45257,
        overall_timeout: Duration::from_millis(1500),
        probe_timeout: Duration::from_millis(500),
        ..DiscoveryConfig::default()
    };

    let start = Instant::now();
    let found = discovery::discover_with(&config).await;
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(5),
        "scan overran its deadline: {elapsed:?}"
    );
    for ip in found {
        assert!(!ip.is_loopback());
    }
}

#[tokio::test]
async fn test_probe_timeout_capped_by_overall_timeout() {
    // A sub-probe-timeout overall deadline must still terminate promptly.
    let config = DiscoveryConfig {
        port: 45257,
        overall_timeout: Duration::from_millis(300),
        probe_timeout: Duration::from_secs(2),
        concurrency: 16,
        ..DiscoveryConfig::default()
    };

    let start = Instant::now();
    let _ = discovery::discover_with(&config).await;
    assert!(start.elapsed() < Duration::from_secs(3));
}
