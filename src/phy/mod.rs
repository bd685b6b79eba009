/*! Access to the transmission medium.

The stack does not own physical transmission: an [Interface] hands every
outgoing Ethernet frame to an [OutputPort] injected at construction. Any
value with a `transmit` method works — a [Loopback] that queues frames in
memory (handy under test), a [TunTapPort] writing to a Linux TAP device,
or something of the embedder's own.

[Interface]: ../iface/struct.Interface.html
[OutputPort]: trait.OutputPort.html
[Loopback]: struct.Loopback.html
[TunTapPort]: struct.TunTapPort.html
*/

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[cfg(target_os = "linux")]
mod sys;

#[cfg(target_os = "linux")]
pub use self::sys::TunTapPort;

/// A sink for outgoing Ethernet frames.
///
/// `frame` is a fully formed frame, header and payload; the port owns
/// whatever happens to it next.
pub trait OutputPort {
    fn transmit(&mut self, frame: &[u8]);
}

impl<T: OutputPort + ?Sized> OutputPort for &mut T {
    fn transmit(&mut self, frame: &[u8]) {
        (**self).transmit(frame)
    }
}

/// Shared ports let a test or driver keep a handle to the port it gave
/// away to an interface.
impl<T: OutputPort + ?Sized> OutputPort for Rc<RefCell<T>> {
    fn transmit(&mut self, frame: &[u8]) {
        self.borrow_mut().transmit(frame)
    }
}

/// A port that queues transmitted frames in memory.
#[derive(Debug, Default)]
pub struct Loopback {
    queue: VecDeque<Vec<u8>>,
}

impl Loopback {
    /// Create a loopback port.
    pub fn new() -> Loopback {
        Loopback::default()
    }

    /// Take the oldest transmitted frame, if any.
    pub fn recv(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// How many frames are queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl OutputPort for Loopback {
    fn transmit(&mut self, frame: &[u8]) {
        self.queue.push_back(frame.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_queues_in_order() {
        let mut port = Loopback::new();
        port.transmit(b"one");
        port.transmit(b"two");
        assert_eq!(port.len(), 2);
        assert_eq!(port.recv().as_deref(), Some(&b"one"[..]));
        assert_eq!(port.recv().as_deref(), Some(&b"two"[..]));
        assert_eq!(port.recv(), None);
    }

    #[test]
    fn shared_port_is_usable_from_both_sides() {
        let port = Rc::new(RefCell::new(Loopback::new()));
        let mut for_iface = port.clone();
        for_iface.transmit(b"frame");
        assert_eq!(port.borrow_mut().recv().as_deref(), Some(&b"frame"[..]));
    }
}
