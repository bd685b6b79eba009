use crate::wire::Ipv4Address;

/// Where datagrams matching a prefix should go: out of which interface,
/// and through which gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The gateway to hand the datagram to. `None` means the matched
    /// network is directly attached and the destination itself is the
    /// next hop.
    pub next_hop: Option<Ipv4Address>,
    /// Index of the egress interface, as returned by
    /// [Router::add_interface].
    ///
    /// [Router::add_interface]: struct.Router.html#method.add_interface
    pub iface: usize,
}

#[derive(Debug, Default)]
struct Node {
    children: [Option<usize>; 2],
    route: Option<Route>,
}

/// A routing table: a binary trie over prefix bits, most significant
/// first.
///
/// Each node stands for one prefix; a route stored at depth `n` matches
/// destinations agreeing with it on the top `n` bits. Lookup walks the
/// destination's bits remembering the deepest route passed, which makes
/// longest-prefix match one 32-step descent, with a default route simply
/// living at the root. Nodes are arena-allocated and referenced by index.
#[derive(Debug)]
pub struct Routes {
    nodes: Vec<Node>,
}

impl Routes {
    /// Creates a new routing table, containing only an empty root.
    pub fn new() -> Routes {
        Routes {
            nodes: vec![Node::default()],
        }
    }

    /// Add a route matching the top `prefix_len` bits of `prefix`,
    /// overwriting any previous route for exactly that prefix.
    ///
    /// # Panics
    /// This function panics if the prefix length is larger than 32.
    pub fn add(&mut self, prefix: Ipv4Address, prefix_len: u8, route: Route) {
        assert!(prefix_len <= 32);
        let bits = prefix.to_bits();
        let mut at = 0;
        for i in 0..prefix_len {
            let bit = ((bits >> (31 - i)) & 1) as usize;
            at = match self.nodes[at].children[bit] {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[at].children[bit] = Some(next);
                    next
                }
            };
        }
        self.nodes[at].route = Some(route);
    }

    /// Find the route with the longest prefix matching `addr`, if any.
    pub fn lookup(&self, addr: &Ipv4Address) -> Option<Route> {
        let bits = addr.to_bits();
        let mut at = 0;
        let mut deepest = self.nodes[0].route;
        for i in 0..32 {
            let bit = ((bits >> (31 - i)) & 1) as usize;
            match self.nodes[at].children[bit] {
                Some(next) => {
                    at = next;
                    if let Some(route) = self.nodes[at].route {
                        deepest = Some(route);
                    }
                }
                None => break,
            }
        }
        deepest
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(iface: usize) -> Route {
        Route {
            next_hop: None,
            iface,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut routes = Routes::new();
        routes.add(Ipv4Address::new(0, 0, 0, 0), 0, route(0));
        routes.add(Ipv4Address::new(10, 0, 0, 0), 8, route(1));
        routes.add(
            Ipv4Address::new(10, 1, 0, 0),
            16,
            Route {
                next_hop: Some(Ipv4Address::new(10, 1, 0, 1)),
                iface: 2,
            },
        );

        let hit = routes.lookup(&Ipv4Address::new(10, 1, 2, 3)).unwrap();
        assert_eq!(hit.iface, 2);
        assert_eq!(hit.next_hop, Some(Ipv4Address::new(10, 1, 0, 1)));

        assert_eq!(routes.lookup(&Ipv4Address::new(10, 2, 0, 1)).unwrap().iface, 1);
        assert_eq!(routes.lookup(&Ipv4Address::new(8, 8, 8, 8)).unwrap().iface, 0);
    }

    #[test]
    fn no_default_means_misses_exist() {
        let mut routes = Routes::new();
        routes.add(Ipv4Address::new(192, 168, 0, 0), 24, route(0));
        assert!(routes.lookup(&Ipv4Address::new(192, 168, 0, 200)).is_some());
        assert!(routes.lookup(&Ipv4Address::new(192, 168, 1, 1)).is_none());
    }

    #[test]
    fn host_routes_match_exactly() {
        let mut routes = Routes::new();
        routes.add(Ipv4Address::new(172, 16, 5, 5), 32, route(3));
        assert_eq!(routes.lookup(&Ipv4Address::new(172, 16, 5, 5)).unwrap().iface, 3);
        assert!(routes.lookup(&Ipv4Address::new(172, 16, 5, 6)).is_none());
    }

    #[test]
    fn equal_prefix_last_writer_wins() {
        let mut routes = Routes::new();
        routes.add(Ipv4Address::new(10, 0, 0, 0), 8, route(0));
        routes.add(Ipv4Address::new(10, 0, 0, 0), 8, route(7));
        assert_eq!(routes.lookup(&Ipv4Address::new(10, 3, 3, 3)).unwrap().iface, 7);
    }

    #[test]
    fn matches_linear_scan_reference() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(1337);

        let mut routes = Routes::new();
        let mut reference: Vec<(u32, u8, Route)> = Vec::new();
        for _ in 0..5000 {
            let ip: u32 = rng.gen();
            let len: u8 = rng.gen_range(0..=32);
            let mask = if len == 0 { 0 } else { !0u32 << (32 - len) };
            let prefix = ip & mask;
            let entry = route(rng.gen_range(0..4));
            routes.add(Ipv4Address::from_bits(prefix), len, entry);
            // Last writer wins in the reference as well.
            reference.retain(|&(p, l, _)| (p, l) != (prefix, len));
            reference.push((prefix, len, entry));
        }

        for _ in 0..1000 {
            let dst: u32 = rng.gen();
            let expected = reference
                .iter()
                .filter(|&&(prefix, len, _)| {
                    let mask = if len == 0 { 0 } else { !0u32 << (32 - len) };
                    dst & mask == prefix
                })
                .max_by_key(|&&(_, len, _)| len)
                .map(|&(_, _, route)| route);
            assert_eq!(routes.lookup(&Ipv4Address::from_bits(dst)), expected);
        }
    }
}
