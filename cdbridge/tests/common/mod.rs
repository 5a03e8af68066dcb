//! Shared in-memory driver stand-ins for the end-to-end tests.

use heapless::Deque;

use cdbridge::core::{Crc16, Mac, NetAddr};
use cdbridge::frame::Frame;
use cdbridge::link::{BusLink, HostTx, NetLink, SendError};
use cdbridge::nvm::{Nvm, NvmStatus};
use cdbridge::packet::Packet;
use cdbridge::time::{Duration, Instant};

pub struct TestBus {
    pub filter: Mac,
    pub tx: Deque<Frame, 8>,
    pub rx: Deque<Frame, 8>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            filter: Mac::new(254),
            tx: Deque::new(),
            rx: Deque::new(),
        }
    }
}

impl BusLink for TestBus {
    fn push_tx(&mut self, frame: Frame) -> Result<(), Frame> {
        self.tx.push_back(frame)
    }
    fn pop_rx(&mut self) -> Option<Frame> {
        self.rx.pop_front()
    }
    fn set_filter(&mut self, mac: Mac) {
        self.filter = mac;
    }
    fn filter(&self) -> Mac {
        self.filter
    }
}

pub struct TestNet {
    pub local: NetAddr,
    pub rx: Deque<Packet, 8>,
    pub tx: Deque<Packet, 8>,
}

impl TestNet {
    pub fn new() -> Self {
        Self {
            local: NetAddr::new(0, Mac::new(254)),
            rx: Deque::new(),
            tx: Deque::new(),
        }
    }
}

impl NetLink for TestNet {
    fn poll_rx(&mut self) {}
    fn poll_tx(&mut self) {}
    fn pop_rx(&mut self) -> Option<Packet> {
        self.rx.pop_front()
    }
    fn push_tx(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.tx.push_back(pkt)
    }
    fn local_addr(&self) -> NetAddr {
        self.local
    }
    fn set_local_mac(&mut self, mac: Mac) {
        self.local.mac = mac;
    }
    fn set_local_net(&mut self, net: u8) {
        self.local.net = net;
    }
}

/// Captures every transfer; `busy` must be cleared by the test to simulate
/// the link draining.
pub struct TestHost {
    pub busy: bool,
    pub sent: Vec<Vec<u8>>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            busy: false,
            sent: Vec::new(),
        }
    }
}

impl HostTx for TestHost {
    fn is_busy(&self) -> bool {
        self.busy
    }
    fn send(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.sent.push(bytes.to_vec());
        self.busy = true;
        Ok(())
    }
}

pub struct TestNvm;

impl Nvm for TestNvm {
    fn page_size(&self) -> u32 {
        1024
    }
    fn unlock(&mut self) {}
    fn lock(&mut self) {}
    fn erase(&mut self, _page_addr: u32, _pages: u32) -> Result<(), NvmStatus> {
        Ok(())
    }
    fn program_word(&mut self, _addr: u32, _word: u32) -> Result<(), NvmStatus> {
        Ok(())
    }
    fn read_word(&self, _addr: u32) -> u32 {
        0
    }
}

pub fn ts(us: u64) -> Instant {
    Instant::MIN + Duration::from_micros(us)
}

/// Builds a host-side frame image `[0xAA][kind][len][body][crc16_le]`.
pub fn host_image(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut wire = vec![0xaa, kind, body.len() as u8];
    wire.extend_from_slice(body);
    let crc = Crc16::sum(&wire);
    wire.extend_from_slice(&crc.to_le_bytes());
    wire
}
