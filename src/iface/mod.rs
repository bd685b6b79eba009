/*! The link layer and below.

An [Interface] owns one attachment to a network: it encapsulates IPv4
datagrams into Ethernet frames, resolving the next hop's hardware address
over ARP (with a bounded, expiring [neighbor cache][NeighborCache] and
per-target request throttling), and classifies received frames back into
datagrams and ARP traffic. A [Router] owns several interfaces and forwards
datagrams between them by longest-prefix match over a binary-trie
[routing table][Routes].

[Interface]: struct.Interface.html
[NeighborCache]: struct.NeighborCache.html
[Router]: struct.Router.html
[Routes]: struct.Routes.html
*/

mod interface;
mod neighbor;
mod route;
mod router;

pub use self::interface::{Config, Interface};
pub use self::neighbor::{Answer as NeighborAnswer, Cache as NeighborCache, Neighbor};
pub use self::route::{Route, Routes};
pub use self::router::Router;
