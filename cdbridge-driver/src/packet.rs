//! CDNET packet object

use cdbridge_core::{Level, Mac, NetAddr, Port, MAX_PACKET_PAYLOAD};
use heapless::Vec;

/// One network-level protocol unit
///
/// Carries the CDNET header fields in decoded form; the frame-level wire
/// encoding belongs to the [`crate::link::NetLink`] implementation.
///
/// Same single-ownership rule as [`crate::frame::Frame`]: a packet lives in
/// exactly one pool, queue, or local variable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    pub level: Level,
    /// Sequence numbering enabled for this flow.
    pub seq: bool,
    /// Packet crosses network segments.
    pub multi_net: bool,
    pub multicast: bool,
    pub src: NetAddr,
    pub dst: NetAddr,
    pub src_mac: Mac,
    pub dst_mac: Mac,
    pub src_port: Port,
    pub dst_port: Port,
    pub data: Vec<u8, MAX_PACKET_PAYLOAD>,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            level: Level::L0,
            seq: false,
            multi_net: false,
            multicast: false,
            src: NetAddr::default(),
            dst: NetAddr::default(),
            src_mac: Mac::new(0),
            dst_mac: Mac::new(0),
            src_port: Port::DEF,
            dst_port: Port::DEF,
            data: Vec::new(),
        }
    }

    /// Stamps the local interface address as the packet source.
    pub fn fill_src_addr(&mut self, local: NetAddr) {
        self.src = local;
        self.src_mac = local.mac;
    }

    /// Turns a request into a reply shell: source and destination addresses,
    /// MACs, and ports swap; the payload is left for the service to rewrite.
    pub fn exchange_src_dst(&mut self, local: NetAddr) {
        self.dst = self.src;
        self.dst_mac = self.src_mac;
        self.src = local;
        self.src_mac = local.mac;
        core::mem::swap(&mut self.src_port, &mut self.dst_port);
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}
