use crate::phy::OutputPort;
use crate::time::Duration;
use crate::wire::Ipv4Address;

use super::interface::Interface;
use super::route::{Route, Routes};

/// A router: several interfaces and a forwarding rule set between them.
///
/// Interfaces are registered once and owned by the router; callers refer
/// to them by the index handed out at registration. [route] drains every
/// interface's ingress queue and forwards each datagram by longest-prefix
/// match: the TTL is checked and decremented, the matched route names the
/// egress interface, and the next hop is the route's gateway or — on a
/// directly attached network — the destination itself. Datagrams with an
/// exhausted TTL or no matching route are dropped.
///
/// [route]: #method.route
pub struct Router<P: OutputPort> {
    interfaces: Vec<Interface<P>>,
    routes: Routes,
}

impl<P: OutputPort> Router<P> {
    /// Create a router with no interfaces and an empty routing table.
    pub fn new() -> Router<P> {
        Router {
            interfaces: Vec::new(),
            routes: Routes::new(),
        }
    }

    /// Add an interface to the router, returning its index.
    pub fn add_interface(&mut self, interface: Interface<P>) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    /// Access an interface by index.
    pub fn interface(&self, index: usize) -> &Interface<P> {
        &self.interfaces[index]
    }

    /// Access an interface by index, mutably: to feed it received frames,
    /// or to drain locally delivered datagrams.
    pub fn interface_mut(&mut self, index: usize) -> &mut Interface<P> {
        &mut self.interfaces[index]
    }

    /// Add a forwarding rule: destinations matching the top `prefix_len`
    /// bits of `prefix` leave through interface `iface`, towards
    /// `next_hop` if given, or directly towards the destination otherwise.
    pub fn add_route(
        &mut self,
        prefix: Ipv4Address,
        prefix_len: u8,
        next_hop: Option<Ipv4Address>,
        iface: usize,
    ) {
        self.routes.add(prefix, prefix_len, Route { next_hop, iface });
    }

    /// Access the routing table.
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Forward every queued datagram to its proper outgoing interface.
    pub fn route(&mut self) {
        for index in 0..self.interfaces.len() {
            while let Some(mut datagram) = self.interfaces[index].poll_ingress() {
                let ttl = datagram.hop_limit();
                if ttl <= 1 {
                    net_debug!("router: TTL expired for {}", datagram.dst_addr());
                    continue;
                }
                datagram.set_hop_limit(ttl - 1);
                datagram.fill_checksum();

                let dst_addr = datagram.dst_addr();
                let Some(route) = self.routes.lookup(&dst_addr) else {
                    net_debug!("router: no route to {}", dst_addr);
                    continue;
                };
                let next_hop = route.next_hop.unwrap_or(dst_addr);
                self.interfaces[route.iface].send_datagram(datagram, next_hop);
            }
        }
    }

    /// Let `elapsed` time pass on every interface.
    pub fn tick(&mut self, elapsed: Duration) {
        for interface in &mut self.interfaces {
            interface.tick(elapsed)
        }
    }
}

impl<P: OutputPort> Default for Router<P> {
    fn default() -> Self {
        Self::new()
    }
}
