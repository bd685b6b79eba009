/*! The two halves of a TCP endpoint.

A connection is a [Sender] and a [Receiver] glued back to back. The
receiver turns inbound [Segment]s into ordered stream bytes through a
[Reassembler] and answers with an [Ack] carrying the acknowledgment
number and advertised window; the sender chops its outbound [ByteStream]
into segments under the flow- and congestion-control window, retransmits
on timeout with exponential backoff, and reacts to duplicate ACKs with
fast retransmit.

Segments here are in-stack value types: header serialization and
checksums belong to whoever puts them on the wire.

[Sender]: struct.Sender.html
[Receiver]: struct.Receiver.html
[Segment]: struct.Segment.html
[Ack]: struct.Ack.html
[Reassembler]: ../storage/struct.Reassembler.html
[ByteStream]: ../storage/struct.ByteStream.html
*/

mod receiver;
mod sender;
mod seq;

pub use self::receiver::Receiver;
pub use self::sender::{Sender, State as SenderState};
pub use self::seq::SeqNumber;

/// A message from a TCP sender to its peer's receiver: one segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    /// Sequence number of the first item in this segment: the SYN if
    /// present, otherwise the first payload byte.
    pub seqno: SeqNumber,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
    pub rst: bool,
}

impl Segment {
    /// How many sequence numbers this segment occupies: SYN and FIN each
    /// count for one, in addition to every payload byte.
    pub fn sequence_length(&self) -> u64 {
        self.syn as u64 + self.payload.len() as u64 + self.fin as u64
    }
}

/// A message from a TCP receiver to its peer's sender: an acknowledgment
/// and window advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    /// The next sequence number the receiver expects, absent before the
    /// first SYN has been seen.
    pub ackno: Option<SeqNumber>,
    pub window_size: u16,
    pub rst: bool,
}
