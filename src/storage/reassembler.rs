use std::collections::BTreeMap;

use super::ByteStream;

/// Reassembles out-of-order substrings of a byte stream.
///
/// Substrings arrive indexed by their absolute position in the stream,
/// possibly out of order, duplicated or overlapping. As soon as the next
/// byte of the stream is known it is pushed into the output [ByteStream];
/// bytes that fit the stream's available capacity but cannot be written
/// yet are held until the gap before them fills in. Bytes beyond the
/// window are discarded: they could not be written even if every earlier
/// gap were filled.
///
/// The out-of-order bytes live directly in the unallocated region of the
/// stream's ring, at the position they will eventually occupy, so memory
/// use is bounded by the window, not by the stream. What has been received
/// is tracked as a set of disjoint `[start, end)` intervals over absolute
/// stream indices.
///
/// [ByteStream]: struct.ByteStream.html
#[derive(Debug)]
pub struct Reassembler<'a> {
    stream: ByteStream<'a>,
    /// Disjoint, coalesced intervals of pending bytes: start -> end.
    /// Every interval lies strictly above the stream's pushed count.
    intervals: BTreeMap<u64, u64>,
    /// Absolute index one past the final byte, once the last substring has
    /// been seen.
    eof_index: Option<u64>,
}

impl<'a> Reassembler<'a> {
    /// Create a reassembler writing into the given stream.
    pub fn new(stream: ByteStream<'a>) -> Reassembler<'a> {
        Reassembler {
            stream,
            intervals: BTreeMap::new(),
            eof_index: None,
        }
    }

    /// Access the output stream.
    pub fn stream(&self) -> &ByteStream<'a> {
        &self.stream
    }

    /// Access the output stream mutably, for the reading side.
    pub fn stream_mut(&mut self) -> &mut ByteStream<'a> {
        &mut self.stream
    }

    /// Return the number of bytes held waiting for a gap to fill in.
    pub fn bytes_pending(&self) -> u64 {
        self.intervals.iter().map(|(start, end)| end - start).sum()
    }

    /// Insert a substring of the stream starting at the absolute index
    /// `first_index`. `is_last` marks the substring that ends the stream;
    /// once every byte before its end has been written, the stream is
    /// closed.
    pub fn insert(&mut self, first_index: u64, data: &[u8], is_last: bool) {
        let first_unassembled = self.stream.bytes_pushed();
        let first_unacceptable = first_unassembled + self.stream.available_capacity() as u64;

        if is_last {
            self.eof_index = Some(first_index + data.len() as u64);
        }

        // Clip to the window; both bounds are half-open.
        let begin = first_index.max(first_unassembled);
        let end = (first_index + data.len() as u64).min(first_unacceptable);
        if begin < end {
            let skip = (begin - first_index) as usize;
            let len = (end - begin) as usize;
            self.stream
                .write_unallocated((begin - first_unassembled) as usize, &data[skip..skip + len]);
            self.add_interval(begin, end);
        }

        // Flush the contiguous prefix.
        while let Some((start, end)) = self
            .intervals
            .first_key_value()
            .map(|(&start, &end)| (start, end))
        {
            if start != self.stream.bytes_pushed() {
                break;
            }
            self.intervals.remove(&start);
            self.stream.enqueue_unallocated((end - start) as usize);
        }

        if self.eof_index == Some(self.stream.bytes_pushed()) {
            self.stream.close();
        }
    }

    /// Record `[start, end)` as received, coalescing with any interval it
    /// overlaps or abuts.
    fn add_interval(&mut self, mut start: u64, mut end: u64) {
        let prev = self
            .intervals
            .range(..=start)
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((prev_start, prev_end)) = prev {
            if prev_end >= start {
                self.intervals.remove(&prev_start);
                start = prev_start;
                end = end.max(prev_end);
            }
        }
        while let Some((next_start, next_end)) = self
            .intervals
            .range(start..)
            .next()
            .map(|(&start, &end)| (start, end))
        {
            if next_start > end {
                break;
            }
            self.intervals.remove(&next_start);
            end = end.max(next_end);
        }
        self.intervals.insert(start, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassembler(capacity: usize) -> Reassembler<'static> {
        Reassembler::new(ByteStream::new(vec![0; capacity]))
    }

    fn read_all(reassembler: &mut Reassembler) -> Vec<u8> {
        let stream = reassembler.stream_mut();
        let mut out = Vec::new();
        loop {
            let chunk = stream.peek().to_vec();
            if chunk.is_empty() {
                break;
            }
            stream.pop(chunk.len());
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn in_order() {
        let mut r = reassembler(8);
        r.insert(0, b"ab", false);
        r.insert(2, b"cd", false);
        assert_eq!(r.stream().bytes_pushed(), 4);
        assert_eq!(r.bytes_pending(), 0);
        assert_eq!(read_all(&mut r), b"abcd");
    }

    #[test]
    fn out_of_order_with_eof() {
        let mut r = reassembler(8);
        r.insert(2, b"cd", false);
        assert_eq!(r.stream().bytes_pushed(), 0);
        assert_eq!(r.bytes_pending(), 2);
        r.insert(0, b"ab", false);
        assert_eq!(r.stream().bytes_pushed(), 4);
        r.insert(4, b"ef", true);
        assert_eq!(r.stream().bytes_pushed(), 6);
        assert_eq!(read_all(&mut r), b"abcdef");
        assert!(r.stream().is_finished());
    }

    #[test]
    fn overlapping_does_not_double_count() {
        let mut r = reassembler(16);
        r.insert(2, b"cdef", false);
        r.insert(4, b"efgh", false);
        assert_eq!(r.bytes_pending(), 6);
        r.insert(1, b"bcd", false);
        assert_eq!(r.bytes_pending(), 7);
        r.insert(0, b"a", false);
        assert_eq!(r.bytes_pending(), 0);
        assert_eq!(read_all(&mut r), b"abcdefgh");
    }

    #[test]
    fn duplicates_are_harmless() {
        let mut r = reassembler(8);
        r.insert(0, b"abcd", false);
        r.insert(0, b"abcd", false);
        r.insert(2, b"cd", false);
        assert_eq!(r.stream().bytes_pushed(), 4);
        assert_eq!(read_all(&mut r), b"abcd");
    }

    #[test]
    fn beyond_window_is_discarded() {
        let mut r = reassembler(4);
        // Window is [0, 4): the byte at index 4 must go.
        r.insert(2, b"cde", false);
        assert_eq!(r.bytes_pending(), 2);
        r.insert(6, b"g", false);
        assert_eq!(r.bytes_pending(), 2);
        r.insert(0, b"ab", false);
        assert_eq!(read_all(&mut r), b"abcd");
    }

    #[test]
    fn interval_ending_at_window_edge_is_kept() {
        let mut r = reassembler(4);
        r.insert(2, b"cd", false);
        assert_eq!(r.bytes_pending(), 2);
        r.insert(0, b"ab", false);
        assert_eq!(read_all(&mut r), b"abcd");
    }

    #[test]
    fn window_follows_the_reader() {
        let mut r = reassembler(4);
        r.insert(0, b"abcd", false);
        assert_eq!(r.stream().available_capacity(), 0);
        // Nothing fits until the reader drains.
        r.insert(4, b"ef", false);
        assert_eq!(r.bytes_pending(), 0);
        r.stream_mut().pop(4);
        r.insert(4, b"ef", false);
        assert_eq!(r.stream().bytes_pushed(), 6);
        assert_eq!(read_all(&mut r), b"ef");
    }

    #[test]
    fn empty_last_substring_closes() {
        let mut r = reassembler(8);
        r.insert(0, b"ab", false);
        assert!(!r.stream().is_closed());
        r.insert(2, b"", true);
        assert!(r.stream().is_closed());
        assert_eq!(read_all(&mut r), b"ab");
        assert!(r.stream().is_finished());
    }

    #[test]
    fn eof_waits_for_the_gap() {
        let mut r = reassembler(8);
        r.insert(2, b"cd", true);
        assert!(!r.stream().is_closed());
        r.insert(0, b"ab", false);
        assert!(r.stream().is_closed());
        assert_eq!(read_all(&mut r), b"abcd");
    }

    #[test]
    fn old_data_is_reclipped() {
        let mut r = reassembler(8);
        r.insert(0, b"abcd", false);
        // Entirely below the assembled point.
        r.insert(0, b"abcd", false);
        assert_eq!(r.stream().bytes_pushed(), 4);
        // Straddling it: only the new tail lands.
        r.insert(2, b"cdef", false);
        assert_eq!(r.stream().bytes_pushed(), 6);
        assert_eq!(read_all(&mut r), b"abcdef");
    }
}
