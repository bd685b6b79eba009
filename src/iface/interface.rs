use std::collections::{BTreeMap, VecDeque};

use crate::phy::OutputPort;
use crate::time::{Duration, Instant};
use crate::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr, Ipv4Address, Ipv4AddressExt, Ipv4Datagram, Ipv4Packet, Ipv4Repr,
};

use super::neighbor::{Answer as NeighborAnswer, Cache as NeighborCache};

/// Configuration structure used for creating a network interface.
#[non_exhaustive]
pub struct Config {
    /// The hardware address the interface will use.
    ///
    /// # Panics
    /// Creating the interface panics if the address is not unicast.
    pub hardware_addr: EthernetAddress,

    /// The protocol address the interface answers ARP requests for, and
    /// uses as the sender address in requests of its own.
    pub ip_addr: Ipv4Address,
}

impl Config {
    pub fn new(hardware_addr: EthernetAddress, ip_addr: Ipv4Address) -> Self {
        Config {
            hardware_addr,
            ip_addr,
        }
    }
}

/// A network interface: the boundary between IPv4 datagrams and Ethernet
/// frames.
///
/// On the way out, [send_datagram] resolves the next hop's hardware
/// address through the neighbor cache; datagrams whose next hop is still
/// unknown wait in a queue keyed by that address while an ARP request
/// goes out (at most one per target per throttle interval). On the way
/// in, [process_frame] discards frames not addressed to us, queues IPv4
/// datagrams for [poll_ingress], and handles ARP: every ARP frame teaches
/// us the sender's mapping (releasing any datagrams waiting on it), and
/// requests for our own address get a unicast reply.
///
/// The interface never blocks; frames leave through the [OutputPort] it
/// was built with.
///
/// [send_datagram]: #method.send_datagram
/// [process_frame]: #method.process_frame
/// [poll_ingress]: #method.poll_ingress
/// [OutputPort]: ../phy/trait.OutputPort.html
pub struct Interface<P: OutputPort> {
    port: P,
    hardware_addr: EthernetAddress,
    ip_addr: Ipv4Address,
    neighbor_cache: NeighborCache,
    /// Datagrams awaiting address resolution, keyed by next hop.
    pending: BTreeMap<Ipv4Address, VecDeque<Ipv4Datagram>>,
    /// Received IPv4 datagrams, for the embedder (or a router) to drain.
    ingress: VecDeque<Ipv4Datagram>,
    now: Instant,
}

impl<P: OutputPort> Interface<P> {
    /// Create a network interface using the previously provided
    /// configuration.
    ///
    /// # Panics
    /// This function panics if the configured hardware address is not
    /// unicast.
    pub fn new(config: Config, port: P) -> Interface<P> {
        Self::check_hardware_addr(&config.hardware_addr);
        Interface {
            port,
            hardware_addr: config.hardware_addr,
            ip_addr: config.ip_addr,
            neighbor_cache: NeighborCache::new(),
            pending: BTreeMap::new(),
            ingress: VecDeque::new(),
            now: Instant::ZERO,
        }
    }

    fn check_hardware_addr(addr: &EthernetAddress) {
        if !addr.is_unicast() {
            panic!("Hardware address {addr} is not unicast")
        }
    }

    /// Get the hardware address of the interface.
    pub fn hardware_addr(&self) -> EthernetAddress {
        self.hardware_addr
    }

    /// Get the IPv4 address of the interface.
    pub fn ipv4_addr(&self) -> Ipv4Address {
        self.ip_addr
    }

    /// The interface's current clock.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Access the neighbor cache.
    pub fn neighbor_cache(&self) -> &NeighborCache {
        &self.neighbor_cache
    }

    /// Forget every learned neighbor, for example after readdressing.
    pub fn flush_neighbor_cache(&mut self) {
        self.neighbor_cache.flush()
    }

    /// Send an IPv4 datagram towards `next_hop`, which is either the final
    /// destination (directly attached) or the gateway on the way there.
    ///
    /// If the next hop's hardware address is not yet known the datagram is
    /// queued and an ARP request goes out, unless one was sent for this
    /// target recently.
    pub fn send_datagram(&mut self, datagram: Ipv4Datagram, next_hop: Ipv4Address) {
        match self.neighbor_cache.lookup(&next_hop, self.now) {
            NeighborAnswer::Found(dst_addr) => self.transmit_ipv4(dst_addr, datagram),
            NeighborAnswer::RateLimited => {
                self.pending.entry(next_hop).or_default().push_back(datagram);
            }
            NeighborAnswer::NotFound => {
                net_debug!(
                    "iface: address {} not in neighbor cache, sending ARP request",
                    next_hop
                );
                let arp_repr = ArpRepr::EthernetIpv4 {
                    operation: ArpOperation::Request,
                    source_hardware_addr: self.hardware_addr,
                    source_protocol_addr: self.ip_addr,
                    target_hardware_addr: EthernetAddress::BROADCAST,
                    target_protocol_addr: next_hop,
                };
                self.transmit_arp(EthernetAddress::BROADCAST, &arp_repr);
                self.neighbor_cache.limit_rate(next_hop, self.now);
                self.pending.entry(next_hop).or_default().push_back(datagram);
            }
        }
    }

    /// Process one received Ethernet frame. Malformed and misaddressed
    /// frames are dropped silently.
    pub fn process_frame(&mut self, frame: &[u8]) {
        let Ok(frame) = EthernetFrame::new_checked(frame) else {
            net_debug!("iface: malformed ethernet frame");
            return;
        };

        // Ignore any frames not directed to our hardware address.
        if !frame.dst_addr().is_broadcast() && frame.dst_addr() != self.hardware_addr {
            return;
        }

        match frame.ethertype() {
            EthernetProtocol::Ipv4 => self.process_ipv4(&frame),
            EthernetProtocol::Arp => self.process_arp(&frame),
            // Drop all other traffic.
            _ => {}
        }
    }

    /// Take the oldest received IPv4 datagram, if any.
    pub fn poll_ingress(&mut self) -> Option<Ipv4Datagram> {
        self.ingress.pop_front()
    }

    /// Let `elapsed` time pass: advance the clock and expire neighbor
    /// cache entries.
    pub fn tick(&mut self, elapsed: Duration) {
        self.now += elapsed;
        self.neighbor_cache.evict_expired(self.now);
    }

    fn process_ipv4(&mut self, frame: &EthernetFrame<&[u8]>) {
        let Ok(packet) = Ipv4Packet::new_checked(frame.payload()) else {
            net_debug!("iface: malformed IPv4 packet");
            return;
        };
        if Ipv4Repr::parse(&packet).is_err() {
            net_debug!("iface: malformed IPv4 packet");
            return;
        }
        // Shed any link-layer padding.
        let total_len = packet.total_len() as usize;
        let buffer = packet.into_inner()[..total_len].to_vec();
        self.ingress.push_back(Ipv4Packet::new_unchecked(buffer));
    }

    fn process_arp(&mut self, frame: &EthernetFrame<&[u8]>) {
        let Ok(packet) = ArpPacket::new_checked(frame.payload()) else {
            net_debug!("iface: malformed ARP packet");
            return;
        };
        let Ok(repr) = ArpRepr::parse(&packet) else {
            net_debug!("iface: unrecognized ARP packet");
            return;
        };

        let ArpRepr::EthernetIpv4 {
            operation,
            source_hardware_addr,
            source_protocol_addr,
            target_protocol_addr,
            ..
        } = repr;

        // Only process REQUEST and REPLY.
        if let ArpOperation::Unknown(_) = operation {
            net_debug!("iface: unknown ARP operation code");
            return;
        }

        // Discard packets with non-unicast source addresses.
        if !source_protocol_addr.x_is_unicast() || !source_hardware_addr.is_unicast() {
            net_debug!("iface: non-unicast ARP source address");
            return;
        }

        // Fill the cache from any ARP packet, request or reply: whoever
        // speaks is reachable at the address they speak from.
        self.neighbor_cache
            .fill(source_protocol_addr, source_hardware_addr, self.now);

        // Release datagrams that were waiting on this mapping, oldest
        // first; the lookup now hits.
        if let Some(mut waiting) = self.pending.remove(&source_protocol_addr) {
            while let Some(datagram) = waiting.pop_front() {
                self.send_datagram(datagram, source_protocol_addr);
            }
        }

        if operation == ArpOperation::Request && target_protocol_addr == self.ip_addr {
            let reply = ArpRepr::EthernetIpv4 {
                operation: ArpOperation::Reply,
                source_hardware_addr: self.hardware_addr,
                source_protocol_addr: self.ip_addr,
                target_hardware_addr: source_hardware_addr,
                target_protocol_addr: source_protocol_addr,
            };
            self.transmit_arp(source_hardware_addr, &reply);
        }
    }

    fn transmit_arp(&mut self, dst_addr: EthernetAddress, arp_repr: &ArpRepr) {
        let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(arp_repr.buffer_len())];
        let mut frame = EthernetFrame::new_unchecked(&mut buffer[..]);
        EthernetRepr {
            src_addr: self.hardware_addr,
            dst_addr,
            ethertype: EthernetProtocol::Arp,
        }
        .emit(&mut frame);
        arp_repr.emit(&mut ArpPacket::new_unchecked(frame.payload_mut()));
        self.port.transmit(&buffer);
    }

    fn transmit_ipv4(&mut self, dst_addr: EthernetAddress, datagram: Ipv4Datagram) {
        let payload = datagram.into_inner();
        let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
        let mut frame = EthernetFrame::new_unchecked(&mut buffer[..]);
        EthernetRepr {
            src_addr: self.hardware_addr,
            dst_addr,
            ethertype: EthernetProtocol::Ipv4,
        }
        .emit(&mut frame);
        frame.payload_mut().copy_from_slice(&payload);
        self.port.transmit(&buffer);
    }
}
