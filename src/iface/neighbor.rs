use heapless::LinearMap;

use crate::config::{IFACE_NEIGHBOR_CACHE_COUNT, NEIGHBOR_CACHE_TTL, NEIGHBOR_SILENT_TIME};
use crate::time::Instant;
use crate::wire::{EthernetAddress, Ipv4Address};

/// A cached neighbor.
///
/// A neighbor mapping translates from a protocol address to a hardware
/// address, and contains the timestamp past which the mapping should be
/// discarded.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    hardware_addr: EthernetAddress,
    expires_at: Instant,
}

impl Neighbor {
    /// The hardware address of the neighbor.
    pub fn hardware_addr(&self) -> EthernetAddress {
        self.hardware_addr
    }

    /// When the mapping stops being trusted.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// An answer to a neighbor cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// The neighbor address is in the cache and the address is valid.
    Found(EthernetAddress),
    /// The neighbor address is not in the cache, or has expired.
    NotFound,
    /// The neighbor address is not in the cache, or has expired, and a
    /// request for it has been sent recently; hold off asking again.
    RateLimited,
}

impl Answer {
    /// Whether the lookup produced a usable hardware address.
    pub fn found(&self) -> bool {
        matches!(self, Answer::Found(_))
    }
}

/// A neighbor cache backed by a map.
///
/// Learned mappings expire after [NEIGHBOR_CACHE_TTL]; requests for a
/// given address are spaced at least [NEIGHBOR_SILENT_TIME] apart. When
/// the bounded map is full, the entry closest to expiry makes room.
///
/// [NEIGHBOR_CACHE_TTL]: ../config/constant.NEIGHBOR_CACHE_TTL.html
/// [NEIGHBOR_SILENT_TIME]: ../config/constant.NEIGHBOR_SILENT_TIME.html
#[derive(Debug)]
pub struct Cache {
    storage: LinearMap<Ipv4Address, Neighbor, IFACE_NEIGHBOR_CACHE_COUNT>,
    silent_until: LinearMap<Ipv4Address, Instant, IFACE_NEIGHBOR_CACHE_COUNT>,
}

impl Cache {
    /// Create a cache.
    pub fn new() -> Self {
        Self {
            storage: LinearMap::new(),
            silent_until: LinearMap::new(),
        }
    }

    /// Translate `protocol_addr`, taking expiry and request throttling
    /// into account.
    pub fn lookup(&self, protocol_addr: &Ipv4Address, timestamp: Instant) -> Answer {
        if let Some(neighbor) = self.storage.get(protocol_addr) {
            if timestamp < neighbor.expires_at {
                return Answer::Found(neighbor.hardware_addr);
            }
        }
        match self.silent_until.get(protocol_addr) {
            Some(&silent_until) if timestamp < silent_until => Answer::RateLimited,
            _ => Answer::NotFound,
        }
    }

    /// Learn (or refresh) a mapping, valid for the cache TTL from
    /// `timestamp`.
    pub fn fill(
        &mut self,
        protocol_addr: Ipv4Address,
        hardware_addr: EthernetAddress,
        timestamp: Instant,
    ) {
        let neighbor = Neighbor {
            hardware_addr,
            expires_at: timestamp + NEIGHBOR_CACHE_TTL,
        };
        if let Ok(old) = self.storage.insert(protocol_addr, neighbor) {
            if old.is_none() {
                net_trace!("iface: learned neighbor {} -> {}", protocol_addr, hardware_addr);
            }
        } else {
            // Full: the entry expiring soonest makes room.
            if let Some(evict) = self
                .storage
                .iter()
                .min_by_key(|(_, neighbor)| neighbor.expires_at)
                .map(|(addr, _)| *addr)
            {
                self.storage.remove(&evict);
            }
            let _ = self.storage.insert(protocol_addr, neighbor);
        }
        self.silent_until.remove(&protocol_addr);
    }

    /// Note that a request for `protocol_addr` has just been sent; further
    /// requests stay silenced for the throttle interval.
    pub fn limit_rate(&mut self, protocol_addr: Ipv4Address, timestamp: Instant) {
        let silent_until = timestamp + NEIGHBOR_SILENT_TIME;
        if self.silent_until.insert(protocol_addr, silent_until).is_err() {
            if let Some(evict) = self
                .silent_until
                .iter()
                .min_by_key(|(_, &until)| until)
                .map(|(addr, _)| *addr)
            {
                self.silent_until.remove(&evict);
            }
            let _ = self.silent_until.insert(protocol_addr, silent_until);
        }
    }

    /// Drop every mapping past its expiry, and every elapsed silence
    /// window.
    pub fn evict_expired(&mut self, timestamp: Instant) {
        let expired: heapless::Vec<Ipv4Address, IFACE_NEIGHBOR_CACHE_COUNT> = self
            .storage
            .iter()
            .filter(|(_, neighbor)| timestamp >= neighbor.expires_at)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &expired {
            net_trace!("iface: neighbor {} expired", addr);
            self.storage.remove(addr);
        }

        let elapsed: heapless::Vec<Ipv4Address, IFACE_NEIGHBOR_CACHE_COUNT> = self
            .silent_until
            .iter()
            .filter(|(_, &until)| timestamp >= until)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &elapsed {
            self.silent_until.remove(addr);
        }
    }

    pub(crate) fn flush(&mut self) {
        self.storage.clear();
        self.silent_until.clear();
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC_A: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0x0a]);
    const MAC_B: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0x0b]);
    const IP_A: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const IP_B: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

    #[test]
    fn lookup_hits_within_ttl() {
        let mut cache = Cache::new();
        let t0 = Instant::from_millis(0);
        cache.fill(IP_A, MAC_A, t0);
        assert_eq!(cache.lookup(&IP_A, t0), Answer::Found(MAC_A));
        assert_eq!(
            cache.lookup(&IP_A, t0 + NEIGHBOR_CACHE_TTL - crate::time::Duration::from_millis(1)),
            Answer::Found(MAC_A)
        );
        // Exactly at the TTL the mapping is stale.
        assert_eq!(
            cache.lookup(&IP_A, t0 + NEIGHBOR_CACHE_TTL),
            Answer::NotFound
        );
    }

    #[test]
    fn rate_limiting_is_per_target() {
        let mut cache = Cache::new();
        let t0 = Instant::from_millis(0);
        cache.limit_rate(IP_A, t0);
        assert_eq!(cache.lookup(&IP_A, t0), Answer::RateLimited);
        assert_eq!(cache.lookup(&IP_B, t0), Answer::NotFound);
        assert_eq!(
            cache.lookup(&IP_A, t0 + NEIGHBOR_SILENT_TIME),
            Answer::NotFound
        );
    }

    #[test]
    fn fill_clears_the_silence() {
        let mut cache = Cache::new();
        let t0 = Instant::from_millis(0);
        cache.limit_rate(IP_A, t0);
        cache.fill(IP_A, MAC_A, t0);
        assert_eq!(cache.lookup(&IP_A, t0), Answer::Found(MAC_A));
    }

    #[test]
    fn refresh_extends_the_ttl() {
        let mut cache = Cache::new();
        let t0 = Instant::from_millis(0);
        cache.fill(IP_A, MAC_A, t0);
        let t1 = t0 + crate::time::Duration::from_secs(20);
        cache.fill(IP_A, MAC_B, t1);
        let t2 = t0 + NEIGHBOR_CACHE_TTL;
        assert_eq!(cache.lookup(&IP_A, t2), Answer::Found(MAC_B));
    }

    #[test]
    fn eviction_on_overflow_prefers_the_oldest() {
        let mut cache = Cache::new();
        for i in 0..IFACE_NEIGHBOR_CACHE_COUNT {
            let ip = Ipv4Address::new(10, 0, (i / 256) as u8, (i % 256) as u8);
            cache.fill(ip, MAC_A, Instant::from_millis(i as i64));
        }
        // One more: the entry filled at t=0 goes.
        let newcomer = Ipv4Address::new(10, 9, 9, 9);
        let now = Instant::from_millis(1000);
        cache.fill(newcomer, MAC_B, now);
        assert_eq!(cache.lookup(&newcomer, now), Answer::Found(MAC_B));
        assert_eq!(
            cache.lookup(&Ipv4Address::new(10, 0, 0, 0), now),
            Answer::NotFound
        );
    }

    #[test]
    fn evict_expired_sweeps() {
        let mut cache = Cache::new();
        let t0 = Instant::from_millis(0);
        cache.fill(IP_A, MAC_A, t0);
        cache.fill(IP_B, MAC_B, t0 + crate::time::Duration::from_secs(10));
        cache.evict_expired(t0 + NEIGHBOR_CACHE_TTL);
        assert_eq!(cache.lookup(&IP_A, t0 + NEIGHBOR_CACHE_TTL), Answer::NotFound);
        assert_eq!(
            cache.lookup(&IP_B, t0 + NEIGHBOR_CACHE_TTL),
            Answer::Found(MAC_B)
        );
    }
}
