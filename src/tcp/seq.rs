use core::fmt;

/// A 32-bit TCP sequence number, wrapping modulo 2³².
///
/// Sequence numbers on the wire are 32 bits and start from an arbitrary
/// initial sequence number (ISN), so the stack works internally with
/// 64-bit *absolute* sequence numbers starting at zero and converts at
/// the edges: [wrap] maps an absolute number onto the wire, [unwrap]
/// recovers the absolute number closest to a caller-provided checkpoint.
///
/// [wrap]: #method.wrap
/// [unwrap]: #method.unwrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// Map the absolute sequence number `abs` into the 32-bit space
    /// starting at `isn`.
    pub fn wrap(abs: u64, isn: SeqNumber) -> SeqNumber {
        SeqNumber(isn.0.wrapping_add(abs as u32))
    }

    /// Recover the absolute sequence number that wraps to `self` and lies
    /// closest to `checkpoint`, preferring the smaller candidate on a tie.
    /// The result is never taken below zero: when the nearer candidate
    /// would be negative, the one within range wins.
    pub fn unwrap(self, isn: SeqNumber, checkpoint: u64) -> u64 {
        const HALF: u64 = 1 << 31;
        const FULL: u64 = 1 << 32;

        let offset = self.0.wrapping_sub(isn.0) as u64;
        let candidate = (checkpoint & !(FULL - 1)) | offset;
        if candidate > checkpoint && candidate - checkpoint >= HALF && candidate >= FULL {
            candidate - FULL
        } else if candidate < checkpoint && checkpoint - candidate > HALF {
            candidate + FULL
        } else {
            candidate
        }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::ops::Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs))
    }
}
