use std::collections::VecDeque;

use crate::config::{MAX_PAYLOAD_SIZE, MAX_RETX_ATTEMPTS};
use crate::storage::ByteStream;
use crate::time::Duration;

use super::{Ack, Segment, SeqNumber};

/// Where the sender stands in the connection lifecycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    /// Nothing sent yet.
    Closed,
    /// SYN transmitted, not yet acknowledged.
    SynSent,
    /// SYN acknowledged, stream flowing.
    Established,
    /// FIN transmitted, not yet acknowledged.
    FinSent,
    /// Everything, including the FIN, acknowledged.
    FinAcked,
    /// The stream is errored: peer reset, or too many retransmissions.
    Reset,
}

#[derive(Debug)]
struct RetransmitTimer {
    running: bool,
    elapsed: Duration,
    current_rto: Duration,
}

impl RetransmitTimer {
    fn new(initial_rto: Duration) -> RetransmitTimer {
        RetransmitTimer {
            running: false,
            elapsed: Duration::ZERO,
            current_rto: initial_rto,
        }
    }

    fn start_if_idle(&mut self) {
        if !self.running {
            self.running = true;
            self.elapsed = Duration::ZERO;
        }
    }

    fn stop(&mut self) {
        self.running = false;
        self.elapsed = Duration::ZERO;
    }
}

/// The sending half of a TCP endpoint.
///
/// The sender reads from its outbound [ByteStream] and emits segments,
/// keeping every transmitted-but-unacknowledged segment in a FIFO for
/// retransmission. Outstanding data is bounded by the smaller of the
/// peer's advertised window and the congestion window; a zero peer window
/// is probed with single-sequence-number segments that are billed to
/// neither the RTO backoff nor the retransmission count.
///
/// Congestion control is the classic trio: slow start below `ssthresh`,
/// additive increase above it, and fast retransmit with window inflation
/// on the third duplicate ACK.
///
/// [ByteStream]: ../storage/struct.ByteStream.html
#[derive(Debug)]
pub struct Sender<'a> {
    input: ByteStream<'a>,
    isn: SeqNumber,
    initial_rto: Duration,

    syn_sent: bool,
    fin_sent: bool,

    /// Highest cumulative acknowledgment from the peer, absolute.
    ackno: u64,
    /// Next absolute sequence number to send.
    next_seqno: u64,

    /// The peer's advertised window; zero means probe with one.
    window_size: u16,

    outstanding: VecDeque<Segment>,

    timer: RetransmitTimer,
    consecutive_retransmissions: u64,

    /// Congestion window and slow-start threshold, in bytes.
    cwnd: usize,
    ssthresh: usize,
    duplicate_acks: u32,
    /// The front of `outstanding` must be resent on the next push.
    fast_retransmit: bool,
}

impl<'a> Sender<'a> {
    /// Create a sender reading from `input`, with the given ISN and
    /// initial retransmission timeout.
    pub fn new(input: ByteStream<'a>, isn: SeqNumber, initial_rto: Duration) -> Sender<'a> {
        Sender {
            input,
            isn,
            initial_rto,
            syn_sent: false,
            fin_sent: false,
            ackno: 0,
            next_seqno: 0,
            window_size: 0,
            outstanding: VecDeque::new(),
            timer: RetransmitTimer::new(initial_rto),
            consecutive_retransmissions: 0,
            cwnd: MAX_PAYLOAD_SIZE,
            ssthresh: usize::MAX,
            duplicate_acks: 0,
            fast_retransmit: false,
        }
    }

    /// Access the outbound stream, for the writing side.
    pub fn stream_mut(&mut self) -> &mut ByteStream<'a> {
        &mut self.input
    }

    /// Access the outbound stream.
    pub fn stream(&self) -> &ByteStream<'a> {
        &self.input
    }

    /// How many sequence numbers are transmitted but not yet acknowledged.
    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.outstanding.iter().map(Segment::sequence_length).sum()
    }

    /// How many retransmissions have happened without an intervening
    /// acknowledgment.
    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }

    /// The congestion window, in bytes.
    pub fn congestion_window(&self) -> usize {
        self.cwnd
    }

    /// Where the sender stands in the connection lifecycle.
    pub fn state(&self) -> State {
        if self.input.has_error() {
            State::Reset
        } else if !self.syn_sent {
            State::Closed
        } else if self.fin_sent {
            if self.outstanding.is_empty() {
                State::FinAcked
            } else {
                State::FinSent
            }
        } else if self.ackno > 0 {
            State::Established
        } else {
            State::SynSent
        }
    }

    /// An empty segment carrying the next sequence number, suitable as a
    /// bare acknowledgment or window probe reply.
    pub fn make_empty_message(&self) -> Segment {
        Segment {
            seqno: SeqNumber::wrap(self.next_seqno, self.isn),
            rst: self.input.has_error(),
            ..Segment::default()
        }
    }

    /// Fill the window: emit as many segments as flow and congestion
    /// control currently allow, calling `transmit` for each.
    pub fn push<F>(&mut self, mut transmit: F)
    where
        F: FnMut(&Segment),
    {
        if self.fast_retransmit {
            self.fast_retransmit = false;
            if let Some(front) = self.outstanding.front() {
                net_debug!("tcp: fast retransmit of seqno {}", front.seqno);
                transmit(front);
                self.timer.start_if_idle();
            }
        }

        let effective_window = if self.window_size == 0 {
            1 // zero-window probe
        } else {
            self.window_size as u64
        };
        let effective_window = effective_window.min(self.cwnd as u64);

        loop {
            let in_flight = self.sequence_numbers_in_flight();
            if effective_window <= in_flight {
                break;
            }
            let mut available = effective_window - in_flight;

            let mut segment = self.make_empty_message();

            if !self.syn_sent {
                segment.syn = true;
                available -= 1;
            }

            let want = (MAX_PAYLOAD_SIZE as u64)
                .min(available)
                .min(self.input.bytes_buffered() as u64) as usize;
            let mut payload = Vec::with_capacity(want);
            while payload.len() < want {
                let chunk = self.input.peek();
                let take = chunk.len().min(want - payload.len());
                payload.extend_from_slice(&chunk[..take]);
                self.input.pop(take);
            }
            available -= payload.len() as u64;
            segment.payload = payload;

            // The FIN needs a sequence number of its own; hold it back
            // until the window has room and the buffer is drained.
            if self.input.is_closed()
                && !self.fin_sent
                && available > 0
                && self.input.bytes_buffered() == 0
            {
                segment.fin = true;
            }

            if segment.sequence_length() == 0 {
                break;
            }

            self.syn_sent |= segment.syn;
            self.fin_sent |= segment.fin;
            self.next_seqno += segment.sequence_length();
            self.timer.start_if_idle();
            transmit(&segment);
            let fin = segment.fin;
            self.outstanding.push_back(segment);
            if fin {
                break;
            }
        }
    }

    /// Process an acknowledgment from the peer.
    pub fn receive(&mut self, ack: &Ack) {
        if ack.rst {
            self.input.set_error();
        }
        self.window_size = ack.window_size;

        let Some(ackno) = ack.ackno else { return };
        let new_ackno = ackno.unwrap(self.isn, self.next_seqno);
        if new_ackno > self.next_seqno {
            // Acknowledges data never sent.
            return;
        }

        if new_ackno > self.ackno {
            // Congestion control counts stream bytes; the SYN and FIN
            // occupy sequence numbers but carry none.
            let mut data_acked = new_ackno - self.ackno;
            if self.ackno == 0 {
                data_acked -= 1;
            }
            if self.fin_sent && new_ackno == self.next_seqno {
                data_acked -= 1;
            }
            self.ackno = new_ackno;

            self.timer.current_rto = self.initial_rto;
            self.timer.elapsed = Duration::ZERO;
            self.consecutive_retransmissions = 0;
            self.duplicate_acks = 0;

            self.grow_window(data_acked);

            while let Some(front) = self.outstanding.front() {
                let end = front.seqno.unwrap(self.isn, self.next_seqno) + front.sequence_length();
                if end <= new_ackno {
                    self.outstanding.pop_front();
                } else {
                    break;
                }
            }
            if self.outstanding.is_empty() {
                self.timer.stop();
            }
        } else if new_ackno == self.ackno && !self.outstanding.is_empty() {
            self.duplicate_acks += 1;
            if self.duplicate_acks == 3 {
                self.ssthresh = (self.cwnd / 2).max(MAX_PAYLOAD_SIZE);
                self.cwnd = self.ssthresh + 3 * MAX_PAYLOAD_SIZE;
                self.fast_retransmit = true;
            } else if self.duplicate_acks > 3 {
                // Each further duplicate signals another segment has left
                // the network.
                self.cwnd += MAX_PAYLOAD_SIZE;
            }
        }
    }

    /// Grow the congestion window for `acked` newly acknowledged sequence
    /// numbers: slow start below `ssthresh`, additive increase above it,
    /// evaluated in at-most-MSS steps so a partial MSS contributes
    /// proportionally.
    fn grow_window(&mut self, mut acked: u64) {
        while acked > 0 {
            let step = acked.min(MAX_PAYLOAD_SIZE as u64) as usize;
            if self.cwnd < self.ssthresh {
                self.cwnd += step;
            } else {
                self.cwnd += MAX_PAYLOAD_SIZE * step / self.cwnd;
            }
            acked -= step as u64;
        }
    }

    /// Account for `elapsed` milliseconds since the last call, retransmitting
    /// the oldest outstanding segment if the timer has expired.
    pub fn tick<F>(&mut self, elapsed: Duration, mut transmit: F)
    where
        F: FnMut(&Segment),
    {
        if !self.timer.running {
            return;
        }
        self.timer.elapsed += elapsed;
        if self.timer.elapsed < self.timer.current_rto {
            return;
        }
        self.timer.elapsed = Duration::ZERO;

        let Some(front) = self.outstanding.front() else {
            return;
        };
        transmit(front);

        if self.window_size == 0 {
            // A probe of a flow-blocked peer, not a loss signal: no
            // backoff, no strike against the retransmission budget.
            return;
        }

        self.timer.current_rto = self.timer.current_rto * 2;
        self.consecutive_retransmissions += 1;
        if self.consecutive_retransmissions > MAX_RETX_ATTEMPTS {
            net_debug!("tcp: connection failed after {MAX_RETX_ATTEMPTS} retransmissions");
            self.input.set_error();
            return;
        }

        // A timeout is a loss signal: collapse to one segment.
        self.ssthresh = (self.cwnd / 2).max(MAX_PAYLOAD_SIZE);
        self.cwnd = MAX_PAYLOAD_SIZE;
        self.duplicate_acks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RTO;

    const MSS: usize = MAX_PAYLOAD_SIZE;

    struct Harness {
        sender: Sender<'static>,
        isn: SeqNumber,
        transmitted: VecDeque<Segment>,
    }

    impl Harness {
        fn new(capacity: usize) -> Harness {
            let isn = SeqNumber(rand::random());
            Harness {
                sender: Sender::new(ByteStream::new(vec![0; capacity]), isn, DEFAULT_RTO),
                isn,
                transmitted: VecDeque::new(),
            }
        }

        fn push(&mut self) {
            let out = &mut self.transmitted;
            self.sender.push(|segment| out.push_back(segment.clone()));
        }

        fn write(&mut self, data: &[u8]) {
            assert_eq!(self.sender.stream_mut().push(data), data.len());
            self.push();
        }

        fn tick(&mut self, ms: u64) {
            let out = &mut self.transmitted;
            self.sender.tick(Duration::from_millis(ms), |segment| {
                out.push_back(segment.clone())
            });
        }

        fn ack(&mut self, abs_ackno: u64, window: u16) {
            self.sender.receive(&Ack {
                ackno: Some(SeqNumber::wrap(abs_ackno, self.isn)),
                window_size: window,
                rst: false,
            });
        }

        fn expect_segment(&mut self) -> Segment {
            self.transmitted.pop_front().expect("expected a segment")
        }

        fn expect_no_segment(&mut self) {
            assert!(
                self.transmitted.is_empty(),
                "unexpected segment: {:?}",
                self.transmitted.front()
            );
        }
    }

    #[test]
    fn syn_then_data_then_fin() {
        let mut h = Harness::new(16);
        h.push();
        let syn = h.expect_segment();
        assert!(syn.syn);
        assert_eq!(syn.seqno, h.isn);
        assert!(syn.payload.is_empty());
        h.expect_no_segment();
        assert_eq!(h.sender.state(), State::SynSent);

        h.ack(1, 4);
        assert_eq!(h.sender.state(), State::Established);
        assert_eq!(h.sender.sequence_numbers_in_flight(), 0);

        h.write(b"abcd");
        h.sender.stream_mut().close();
        h.push();
        let seg = h.expect_segment();
        assert_eq!(seg.seqno, h.isn + 1);
        assert_eq!(seg.payload, b"abcd");
        // Window had room for the payload only; FIN waits for its own
        // sequence number.
        assert!(!seg.fin);
        h.expect_no_segment();

        h.ack(5, 4);
        h.push();
        let fin = h.expect_segment();
        assert!(fin.fin);
        assert!(fin.payload.is_empty());
        assert_eq!(fin.seqno, h.isn + 5);
        assert_eq!(h.sender.state(), State::FinSent);

        h.ack(6, 4);
        assert_eq!(h.sender.sequence_numbers_in_flight(), 0);
        assert_eq!(h.sender.state(), State::FinAcked);
    }

    #[test]
    fn fin_piggybacks_when_window_allows() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(1, 16);
        h.sender.stream_mut().push(b"abcd");
        h.sender.stream_mut().close();
        h.push();
        let seg = h.expect_segment();
        assert_eq!(seg.payload, b"abcd");
        assert!(seg.fin);
        assert_eq!(seg.sequence_length(), 5);
    }

    #[test]
    fn respects_the_peer_window() {
        let mut h = Harness::new(64);
        h.push();
        h.expect_segment();
        h.ack(1, 6);
        h.write(b"0123456789");
        let seg = h.expect_segment();
        assert_eq!(seg.payload, b"012345");
        h.expect_no_segment();
        h.ack(7, 6);
        h.push();
        assert_eq!(h.expect_segment().payload, b"6789");
    }

    #[test]
    fn segments_are_capped_at_mss() {
        let mut h = Harness::new(3 * MSS);
        h.push();
        h.expect_segment();
        h.ack(1, u16::MAX);
        // Grow the congestion window past one MSS first.
        let fill = vec![b'y'; MSS];
        h.write(&fill);
        assert_eq!(h.expect_segment().payload.len(), MSS);
        h.ack(1 + MSS as u64, u16::MAX);

        let data = vec![b'x'; MSS + 5];
        h.write(&data);
        assert_eq!(h.expect_segment().payload.len(), MSS);
        assert_eq!(h.expect_segment().payload.len(), 5);
        h.expect_no_segment();
    }

    #[test]
    fn retransmission_backs_off_and_gives_up() {
        let mut h = Harness::new(16);
        h.push();
        let syn = h.expect_segment();
        assert!(syn.syn);

        // Window is still zero before the first ack, so pretend the peer
        // advertised one: backoff applies only with a nonzero window.
        h.sender.receive(&Ack {
            ackno: None,
            window_size: 4,
            rst: false,
        });

        h.tick(999);
        h.expect_no_segment();
        h.tick(1);
        assert_eq!(h.expect_segment().seqno, syn.seqno);
        assert_eq!(h.sender.consecutive_retransmissions(), 1);

        h.tick(1999);
        h.expect_no_segment();
        h.tick(1);
        assert_eq!(h.expect_segment().seqno, syn.seqno);
        assert_eq!(h.sender.consecutive_retransmissions(), 2);

        // Keep doubling until the attempt budget runs out.
        for n in 3..=MAX_RETX_ATTEMPTS {
            h.tick(1000 << (n - 1));
            h.expect_segment();
            assert_eq!(h.sender.consecutive_retransmissions(), n);
            assert!(!h.sender.stream().has_error());
        }
        h.tick(1000 << MAX_RETX_ATTEMPTS);
        h.expect_segment();
        assert!(h.sender.stream().has_error());
        assert_eq!(h.sender.state(), State::Reset);
    }

    #[test]
    fn ack_resets_the_backoff() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(1, 8);
        h.write(b"ab");
        h.expect_segment();

        h.tick(1000);
        h.expect_segment();
        assert_eq!(h.sender.consecutive_retransmissions(), 1);

        // Progress: timer and RTO wind back.
        h.ack(3, 8);
        assert_eq!(h.sender.consecutive_retransmissions(), 0);
        h.write(b"cd");
        h.expect_segment();
        h.tick(999);
        h.expect_no_segment();
        h.tick(1);
        h.expect_segment();
    }

    #[test]
    fn partial_ack_keeps_the_front() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(1, 16);
        h.write(b"abcd");
        h.expect_segment();
        h.write(b"efgh");
        h.expect_segment();

        // Only the first segment is covered.
        h.ack(5, 16);
        assert_eq!(h.sender.sequence_numbers_in_flight(), 4);
        h.tick(1000);
        assert_eq!(h.expect_segment().payload, b"efgh");
    }

    #[test]
    fn future_ack_is_ignored() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(100, 16);
        assert_eq!(h.sender.sequence_numbers_in_flight(), 1);
        assert_eq!(h.sender.state(), State::SynSent);
    }

    #[test]
    fn zero_window_probe() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(1, 0);
        h.write(b"abc");
        // Window zero is probed with a single byte.
        let probe = h.expect_segment();
        assert_eq!(probe.payload, b"a");
        h.expect_no_segment();

        // Probes neither back off nor count as retransmissions.
        h.tick(1000);
        assert_eq!(h.expect_segment().payload, b"a");
        assert_eq!(h.sender.consecutive_retransmissions(), 0);
        h.tick(1000);
        assert_eq!(h.expect_segment().payload, b"a");
        assert_eq!(h.sender.consecutive_retransmissions(), 0);

        // Window opens: the rest flows.
        h.ack(2, 8);
        h.push();
        assert_eq!(h.expect_segment().payload, b"bc");
    }

    #[test]
    fn slow_start_doubles_per_round_trip() {
        let mut h = Harness::new(8 * MSS);
        h.push();
        h.expect_segment();
        h.ack(1, u16::MAX);
        assert_eq!(h.sender.congestion_window(), MSS);

        let data = vec![b'a'; 4 * MSS];
        h.write(&data);
        // cwnd of one MSS admits a single segment.
        assert_eq!(h.expect_segment().payload.len(), MSS);
        h.expect_no_segment();

        h.ack(1 + MSS as u64, u16::MAX);
        assert_eq!(h.sender.congestion_window(), 2 * MSS);
        h.push();
        assert_eq!(h.expect_segment().payload.len(), MSS);
        assert_eq!(h.expect_segment().payload.len(), MSS);
        h.expect_no_segment();

        h.ack(1 + 3 * MSS as u64, u16::MAX);
        assert_eq!(h.sender.congestion_window(), 4 * MSS);
        h.push();
        assert_eq!(h.expect_segment().payload.len(), MSS);
        h.expect_no_segment();
    }

    #[test]
    fn timeout_collapses_the_window() {
        let mut h = Harness::new(8 * MSS);
        h.push();
        h.expect_segment();
        h.ack(1, u16::MAX);

        let data = vec![b'a'; 4 * MSS];
        h.write(&data);
        h.expect_segment();
        h.ack(1 + MSS as u64, u16::MAX);
        h.push();
        h.expect_segment();
        h.expect_segment();
        // cwnd is now 2 MSS with 2 MSS in flight.

        h.tick(1000);
        h.expect_segment(); // retransmission
        assert_eq!(h.sender.congestion_window(), MSS);

        // ssthresh became max(2 MSS / 2, MSS) = MSS, so growth from here
        // is additive, one step per MSS acknowledged.
        h.ack(1 + 3 * MSS as u64, u16::MAX);
        let cwnd = h.sender.congestion_window();
        assert!(cwnd > MSS && cwnd < 3 * MSS, "cwnd = {cwnd}");
    }

    #[test]
    fn congestion_avoidance_grows_per_mss_chunk() {
        let mut h = Harness::new(16 * MSS);
        h.push();
        h.expect_segment();
        h.ack(1, u16::MAX);

        let data = vec![b'a'; 8 * MSS];
        h.write(&data);
        h.expect_segment(); // 1 MSS in flight, cwnd 1 MSS
        h.ack(1 + MSS as u64, u16::MAX); // cwnd 2 MSS
        h.push();
        h.expect_segment();
        h.expect_segment();
        h.ack(1 + 3 * MSS as u64, u16::MAX); // cwnd 4 MSS
        h.push();
        for _ in 0..4 {
            h.expect_segment();
        }
        h.expect_no_segment();

        // Force a timeout: ssthresh = 2 MSS, cwnd = 1 MSS.
        h.tick(1000);
        h.expect_segment();

        // Ack three MSS at once. The first chunk is still slow start and
        // doubles cwnd to ssthresh; the next two are congestion avoidance,
        // each growing cwnd by MSS * MSS / cwnd at the then-current cwnd:
        // 2000 -> 2500 -> 2900.
        h.ack(1 + 6 * MSS as u64, u16::MAX);
        assert_eq!(h.sender.congestion_window(), 2900);
    }

    #[test]
    fn fast_retransmit_on_third_duplicate() {
        let mut h = Harness::new(16 * MSS);
        h.push();
        h.expect_segment();
        h.ack(1, u16::MAX);

        h.write(b"abcd");
        let first = h.expect_segment();
        h.write(b"efgh");
        h.expect_segment();

        // Three duplicate acks for the first byte.
        h.ack(1, u16::MAX);
        h.ack(1, u16::MAX);
        assert_eq!(h.sender.congestion_window(), MSS);
        h.ack(1, u16::MAX);
        // ssthresh = max(MSS/2, MSS) = MSS; cwnd = ssthresh + 3 MSS.
        assert_eq!(h.sender.congestion_window(), 4 * MSS);

        // The next push resends the oldest outstanding segment first.
        h.push();
        let resent = h.expect_segment();
        assert_eq!(resent.seqno, first.seqno);
        assert_eq!(resent.payload, first.payload);

        // Further duplicates inflate the window by one MSS each.
        h.ack(1, u16::MAX);
        assert_eq!(h.sender.congestion_window(), 5 * MSS);

        // Real progress deflates nothing here but resets the counter.
        h.ack(9, u16::MAX);
        assert_eq!(h.sender.sequence_numbers_in_flight(), 0);
    }

    #[test]
    fn duplicate_acks_without_outstanding_data_are_plain() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.ack(1, 16);
        // Nothing outstanding: repeats of the current ackno do nothing.
        h.ack(1, 16);
        h.ack(1, 16);
        h.ack(1, 16);
        h.push();
        h.expect_no_segment();
        assert_eq!(h.sender.congestion_window(), MSS);
    }

    #[test]
    fn rst_from_peer_poisons_the_stream() {
        let mut h = Harness::new(16);
        h.push();
        h.expect_segment();
        h.sender.receive(&Ack {
            ackno: None,
            window_size: 0,
            rst: true,
        });
        assert!(h.sender.stream().has_error());
        assert!(h.sender.make_empty_message().rst);
        assert_eq!(h.sender.state(), State::Reset);
    }

    #[test]
    fn empty_message_carries_next_seqno() {
        let mut h = Harness::new(16);
        let msg = h.sender.make_empty_message();
        assert_eq!(msg.seqno, h.isn);
        assert_eq!(msg.sequence_length(), 0);
        h.push();
        h.expect_segment();
        let msg = h.sender.make_empty_message();
        assert_eq!(msg.seqno, h.isn + 1);
    }
}
