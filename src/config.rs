//! Stack-wide tuning constants.

use crate::time::Duration;

/// Maximum TCP payload carried by a single segment.
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Initial (and post-ack reset) retransmission timeout.
pub const DEFAULT_RTO: Duration = Duration::from_millis(1000);

/// Retransmissions beyond this count abort the connection.
pub const MAX_RETX_ATTEMPTS: u64 = 8;

/// Largest receive window a TCP endpoint will advertise.
pub const MAX_ADVERTISED_WINDOW: usize = 65535;

/// How long a learned neighbor mapping stays valid.
pub const NEIGHBOR_CACHE_TTL: Duration = Duration::from_secs(30);

/// Minimum interval between ARP requests for the same protocol address.
pub const NEIGHBOR_SILENT_TIME: Duration = Duration::from_secs(5);

/// Capacity of the per-interface neighbor cache.
pub const IFACE_NEIGHBOR_CACHE_COUNT: usize = 64;
