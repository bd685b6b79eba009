use crate::config::MAX_ADVERTISED_WINDOW;
use crate::storage::{ByteStream, Reassembler};

use super::{Ack, Segment, SeqNumber};

/// The receiving half of a TCP endpoint.
///
/// Inbound segments are translated into stream bytes through a
/// [Reassembler]; the acknowledgment sent back is derived from how much of
/// the stream has been assembled, so the receiver itself keeps almost no
/// state: just the ISN learned from the first SYN.
///
/// [Reassembler]: ../storage/struct.Reassembler.html
#[derive(Debug)]
pub struct Receiver<'a> {
    reassembler: Reassembler<'a>,
    isn: Option<SeqNumber>,
}

impl<'a> Receiver<'a> {
    /// Create a receiver assembling into the given reassembler.
    pub fn new(reassembler: Reassembler<'a>) -> Receiver<'a> {
        Receiver {
            reassembler,
            isn: None,
        }
    }

    /// Access the assembled output stream.
    pub fn stream(&self) -> &ByteStream<'a> {
        self.reassembler.stream()
    }

    /// Access the assembled output stream mutably, for the reading side.
    pub fn stream_mut(&mut self) -> &mut ByteStream<'a> {
        self.reassembler.stream_mut()
    }

    /// Access the reassembler.
    pub fn reassembler(&self) -> &Reassembler<'a> {
        &self.reassembler
    }

    /// Process one inbound segment.
    pub fn receive(&mut self, segment: &Segment) {
        if segment.rst {
            self.reassembler.stream_mut().set_error();
            return;
        }

        let isn = match self.isn {
            Some(isn) => isn,
            None => {
                if !segment.syn {
                    // Nothing is in sequence before the SYN.
                    return;
                }
                self.isn = Some(segment.seqno);
                segment.seqno
            }
        };

        // Unwrap near the first unassembled byte. The +1 accounts for the
        // SYN occupying absolute sequence number zero.
        let checkpoint = self.reassembler.stream().bytes_pushed() + 1;
        let abs_seq = segment.seqno.unwrap(isn, checkpoint);

        let first_index = if segment.syn {
            0
        } else if abs_seq == 0 {
            // A data segment claiming the SYN's slot carries no stream byte.
            return;
        } else {
            abs_seq - 1
        };

        self.reassembler
            .insert(first_index, &segment.payload, segment.fin);
    }

    /// Produce the acknowledgment to send back to the peer.
    pub fn send(&self) -> Ack {
        let stream = self.reassembler.stream();
        let ackno = self.isn.map(|isn| {
            // The SYN counts for one sequence number, and the FIN for one
            // more once the whole stream has been assembled and closed.
            let abs = stream.bytes_pushed() + 1 + stream.is_closed() as u64;
            SeqNumber::wrap(abs, isn)
        });
        Ack {
            ackno,
            window_size: stream.available_capacity().min(MAX_ADVERTISED_WINDOW) as u16,
            rst: stream.has_error(),
        }
    }
}
