/*! A user-space TCP/IP stack core, built for clarity over throughput.

The crate is split along the same seams as the protocols themselves:

 * [wire] deals with packet representation: extracting fields from octet
   buffers and emitting them back, through the `Packet` and `Repr` families.
 * [storage] holds the transport byte plumbing: the bounded [ByteStream]
   and the out-of-order [Reassembler] feeding it.
 * [tcp] implements the two halves of a TCP endpoint: the [Receiver] that
   turns segments into stream bytes, and the [Sender] that turns stream
   bytes into segments, with retransmission and congestion control.
 * [iface] is the link layer: an [Interface] that resolves next hops over
   ARP and a [Router] that forwards datagrams by longest-prefix match.
 * [phy] is the escape hatch to the outside world: the [OutputPort]
   capability that frames are handed to, and a Linux TUN/TAP binding.

Nothing in the core reads a wall clock or blocks. Time advances only when
the embedder calls `tick`, which keeps every test deterministic.

[wire]: crate::wire
[storage]: crate::storage
[ByteStream]: crate::storage::ByteStream
[Reassembler]: crate::storage::Reassembler
[tcp]: crate::tcp
[Receiver]: crate::tcp::Receiver
[Sender]: crate::tcp::Sender
[iface]: crate::iface
[Interface]: crate::iface::Interface
[Router]: crate::iface::Router
[phy]: crate::phy
[OutputPort]: crate::phy::OutputPort
*/

#[macro_use]
mod macros; // this must come before the modules using net_trace!

pub mod config;
pub mod iface;
pub mod phy;
pub mod storage;
pub mod tcp;
pub mod time;
pub mod wire;
