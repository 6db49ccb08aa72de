//! In-process serial link: the vehicle side and the controller side share two
//! byte streams and run the same framing a real mote connection would.

use super::codec::{self, FrameReader};
use super::MessageChannel;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Link {
    to_peer: Vec<u8>,
    to_vehicle: Vec<u8>,
    open: bool,
    /// Outbound vehicle frames still to be discarded.
    drop_to_peer: usize,
}

/// Vehicle side of the link.
#[derive(Debug)]
pub struct MemoryChannel {
    link: Rc<RefCell<Link>>,
    reader: FrameReader,
}

/// Controller side of the link.
#[derive(Debug)]
pub struct PeerEnd {
    link: Rc<RefCell<Link>>,
    reader: FrameReader,
}

/// Creates a connected pair.
pub fn pair() -> (MemoryChannel, PeerEnd) {
    let link = Rc::new(RefCell::new(Link {
        open: true,
        ..Default::default()
    }));
    (
        MemoryChannel {
            link: Rc::clone(&link),
            reader: FrameReader::prefixed(),
        },
        PeerEnd {
            link,
            reader: FrameReader::plain(),
        },
    )
}

impl MessageChannel for MemoryChannel {
    fn send(&mut self, bytes: &[u8]) {
        let mut link = self.link.borrow_mut();
        if link.drop_to_peer > 0 {
            link.drop_to_peer -= 1;
            return;
        }
        link.to_peer.extend(codec::encode_frame(bytes, false));
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        let incoming = std::mem::take(&mut self.link.borrow_mut().to_vehicle);
        self.reader.push(&incoming);
        self.reader.next_frame()
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.link.borrow_mut().open = false;
    }
}

impl PeerEnd {
    pub fn send(&mut self, bytes: &[u8]) {
        self.link.borrow_mut().to_vehicle.extend(codec::encode_frame(bytes, true));
    }

    /// Controller debug output, ignored by the vehicle.
    pub fn log_line(&mut self, text: &str) {
        let mut link = self.link.borrow_mut();
        link.to_vehicle.extend_from_slice(text.as_bytes());
        link.to_vehicle.push(b'\n');
    }

    pub fn try_receive(&mut self) -> Option<Vec<u8>> {
        let incoming = std::mem::take(&mut self.link.borrow_mut().to_peer);
        self.reader.push(&incoming);
        self.reader.next_frame()
    }

    /// False once the vehicle side has been dropped.
    pub fn is_open(&self) -> bool {
        self.link.borrow().open
    }

    /// Silently loses the next `count` frames the vehicle sends.
    pub fn drop_outbound(&mut self, count: usize) {
        self.link.borrow_mut().drop_to_peer += count;
    }
}
