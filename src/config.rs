//! Configuration surface (spec §6.3). A single immutable value passed into
//! the engine constructor, never a process-wide singleton (see spec §9's
//! note on global state).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Default mDNS UDP port.
pub const DEFAULT_PORT: u16 = 5353;

/// All fields here are overridable at startup; [`Config::default`] returns
/// the values from spec.md's configuration table.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// IPv4 multicast group used for mDNS traffic.
    pub mdns_ipv4: Ipv4Addr,

    /// IPv6 multicast group used for mDNS traffic.
    pub mdns_ipv6: Ipv6Addr,

    /// mDNS UDP port (both groups).
    pub mdns_port: u16,

    /// Total time budget the resolver gets before giving up (§4.5).
    pub resolution_timeout: Duration,

    /// First retransmission delay of the resolver's back-off schedule.
    pub resolution_interval: Duration,

    /// Total time budget probing gets before announcing unconditionally.
    pub probing_timeout: Duration,

    /// Delay between successive probes.
    pub probing_interval: Duration,

    /// Number of probes sent before announcing.
    pub probing_number: u32,

    /// Delay between successive goodbye responses on deregistration.
    pub cancellation_interval: Duration,

    /// Number of goodbye responses sent on deregistration.
    pub cancellation_number: u32,

    /// Default TTL applied to newly registered/announced records.
    pub ttl_default: Duration,

    /// Grace period after a record's nominal expiry before it is treated
    /// as fully gone (used by the cache's lazy expiry check).
    pub ttl_expiry_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mdns_ipv4: Ipv4Addr::new(224, 0, 0, 251),
            mdns_ipv6: "ff02::fb".parse().expect("valid link-local mDNS group"),
            mdns_port: DEFAULT_PORT,

            resolution_timeout: Duration::from_millis(6000),
            resolution_interval: Duration::from_millis(200),

            probing_timeout: Duration::from_millis(6000),
            probing_interval: Duration::from_millis(250),
            probing_number: 3,

            cancellation_interval: Duration::from_millis(250),
            cancellation_number: 3,

            ttl_default: Duration::from_millis(3_600_000),
            ttl_expiry_grace: Duration::from_millis(1000),
        }
    }
}
