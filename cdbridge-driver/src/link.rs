//! Transport interfaces between drivers and the bridge core
//!
//! All methods are non-blocking: the bridge loop polls them once per
//! iteration. A `push_*` method that cannot accept a unit returns it to the
//! caller instead of waiting.

use cdbridge_core::{Mac, NetAddr};

use crate::frame::Frame;
use crate::packet::Packet;

/// CDBUS controller transaction layer
///
/// Completion notifications are interrupt-driven inside the driver; the
/// queue-facing methods below are safe to call from the bridge loop while the
/// driver's interrupt handlers run.
pub trait BusLink {
    /// Queues a frame for bus transmission. Returns the frame when the
    /// driver's transmit queue is full.
    fn push_tx(&mut self, frame: Frame) -> Result<(), Frame>;

    /// Takes the next frame received from the bus, if any.
    fn pop_rx(&mut self) -> Option<Frame>;

    /// Sets the receive filter (the local node address).
    fn set_filter(&mut self, mac: Mac);

    fn filter(&self) -> Mac;
}

/// CDNET codec layered over a frame transport
///
/// In raw mode the underlying transport is the bus; in pass-thru mode it is
/// the host tunnel. Either way the bridge core only moves decoded packets.
pub trait NetLink {
    /// Decodes pending transport frames into the packet receive queue.
    fn poll_rx(&mut self);

    /// Encodes queued packets onto the underlying frame transport.
    fn poll_tx(&mut self);

    /// Takes the next received packet, if any.
    fn pop_rx(&mut self) -> Option<Packet>;

    /// Queues a packet for transmission. Returns the packet when the
    /// transmit queue is full.
    fn push_tx(&mut self, pkt: Packet) -> Result<(), Packet>;

    fn local_addr(&self) -> NetAddr;

    fn set_local_mac(&mut self, mac: Mac);

    fn set_local_net(&mut self, net: u8);
}

/// The host link cannot accept a transfer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendError;

/// Host-facing transmit primitive (USB CDC endpoint or UART DMA)
pub trait HostTx {
    /// An earlier transfer is still in flight. The buffer handed to
    /// [`HostTx::send`] must stay untouched until this reports `false`.
    fn is_busy(&self) -> bool;

    /// Starts one transfer. Fails while busy.
    fn send(&mut self, data: &[u8]) -> Result<(), SendError>;
}
