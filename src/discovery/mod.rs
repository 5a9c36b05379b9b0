//! Discovery of Balboa boards on the local network.
//!
//! Boards answer TCP on port 4257 and nothing else identifies them at this
//! layer, so discovery is a reachability sweep: every non-loopback IPv4
//! interface contributes its /24 subnet, and all 254 host addresses are
//! probed concurrently under a semaphore bound. Hosts that refuse, time
//! out, or are unreachable are simply not spas; probe failures never fail
//! the scan.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;

/// Scan the local /24 subnets with the default configuration and the given
/// overall deadline. Returns the reachable addresses, possibly empty.
pub async fn discover(timeout: Duration) -> Vec<Ipv4Addr> {
    discover_with(&DiscoveryConfig {
        overall_timeout: timeout,
        ..DiscoveryConfig::default()
    })
    .await
}

/// Scan with explicit configuration.
pub async fn discover_with(config: &DiscoveryConfig) -> Vec<Ipv4Addr> {
    let subnets = local_subnets();
    if subnets.is_empty() {
        debug!("no usable IPv4 interfaces, nothing to scan");
        return Vec::new();
    }

    let probe_timeout = config.probe_timeout.min(config.overall_timeout);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let deadline = Instant::now() + config.overall_timeout;

    let mut probes = JoinSet::new();
    for subnet in &subnets {
        info!(
            "scanning subnet {}.{}.{}.0/24 for spa boards",
            subnet[0], subnet[1], subnet[2]
        );
        for host in 1..=254u8 {
            let ip = Ipv4Addr::new(subnet[0], subnet[1], subnet[2], host);
            let addr = SocketAddr::from((ip, config.port));
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                probe_host(addr, probe_timeout).await.then_some(ip)
            });
        }
    }

    let mut found = Vec::new();
    loop {
        tokio::select! {
            next = probes.join_next() => match next {
                Some(Ok(Some(ip))) => {
                    info!("found spa board at {ip}");
                    found.push(ip);
                }
                Some(_) => {}
                None => break,
            },
            () = tokio::time::sleep_until(deadline) => {
                debug!(
                    "discovery deadline reached, abandoning {} outstanding probes",
                    probes.len()
                );
                probes.abort_all();
                break;
            }
        }
    }

    found.sort_unstable();
    found.dedup();
    found
}

/// Probe a single host: reachable if the TCP handshake completes within
/// the timeout.
pub(crate) async fn probe_host(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Distinct /24 prefixes of the usable local IPv4 addresses.
fn local_subnets() -> Vec<[u8; 3]> {
    let mut subnets = BTreeSet::new();
    for addr in local_ipv4_addresses() {
        if addr.is_loopback() || addr.is_link_local() {
            continue;
        }
        let [a, b, c, _] = addr.octets();
        subnets.insert([a, b, c]);
    }
    subnets.into_iter().collect()
}

/// Enumerate IPv4 addresses of interfaces that are up and not loopback.
#[cfg(unix)]
fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();

    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(std::ptr::addr_of_mut!(ifaddrs)) != 0 {
            return addresses;
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;

            if !ifa.ifa_addr.is_null() {
                let family = i32::from((*ifa.ifa_addr).sa_family);
                let flags = ifa.ifa_flags as i32;
                let usable = flags & libc::IFF_UP != 0 && flags & libc::IFF_LOOPBACK == 0;

                if family == libc::AF_INET && usable {
                    #[allow(clippy::cast_ptr_alignment)]
                    let sockaddr = ifa.ifa_addr.cast::<libc::sockaddr_in>();
                    addresses.push(Ipv4Addr::from(u32::from_be((*sockaddr).sin_addr.s_addr)));
                }
            }

            current = ifa.ifa_next;
        }

        libc::freeifaddrs(ifaddrs);
    }

    addresses
}

#[cfg(not(unix))]
fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    Vec::new()
}
