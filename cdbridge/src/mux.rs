//! Host-ward output multiplexer
//!
//! Serializes every host-bound unit into a small ring of transfer buffers
//! sized for one USB/DMA transaction each. Buffers rotate through three
//! states: free, filling (`current`), queued (`ready`), in flight on the
//! link (`inflight`).
//!
//! Space is secured before a unit leaves its source: when the back buffer
//! cannot hold the unit and no fresh buffer is free, the unit is deferred
//! (bus frames park in a holdover slot, queued units go back to the queue
//! head) and the fill pass stops until a buffer drains.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::config::{BridgeConfig, Mode};
use crate::core::{Crc16, FRAME_CRC_LEN};
use crate::deframe::{HOST_MAC, KIND_NET};
use crate::frame::Frame;
use crate::link::{BusLink, HostTx};
use crate::packet::Packet;
use crate::pool::{Pool, Queue};

pub const XFER_LEN: usize = 512;
pub const XFER_COUNT: usize = 3;

pub type XferBuf = Vec<u8, XFER_LEN>;

pub struct HostMux<M: RawMutex> {
    free: Pool<M, XferBuf, XFER_COUNT>,
    ready: Queue<M, XferBuf, XFER_COUNT>,
    current: Option<XferBuf>,
    inflight: Option<XferBuf>,
    /// Bus frame popped before the buffers ran out; consumed first next pass.
    pending_bus: Option<Frame>,
}

impl<M: RawMutex> HostMux<M> {
    pub fn new() -> Self {
        Self {
            free: Pool::new(),
            ready: Queue::new(),
            current: None,
            inflight: None,
            pending_bus: None,
        }
    }

    /// Makes sure the filling buffer has `need` spare bytes, rotating it to
    /// the ready queue and starting a fresh one when short. False when every
    /// buffer is occupied.
    fn ensure_room(&mut self, need: usize) -> bool {
        if let Some(buf) = &self.current {
            if XFER_LEN - buf.len() >= need {
                return true;
            }
            let full = unwrap!(self.current.take());
            // Cannot overflow: only XFER_COUNT buffers circulate.
            unwrap!(self.ready.push_back(full).ok());
        }
        match self.free.acquire() {
            Some(mut buf) => {
                buf.clear();
                self.current = Some(buf);
                true
            }
            None => false,
        }
    }

    /// Appends a bus-rx frame in host encapsulation:
    /// `[0x56][0xAA][plen + 2][src][dst][payload][crc16_le]`.
    fn encap(buf: &mut XferBuf, frame: &Frame) {
        let start = buf.len();
        unwrap!(buf
            .extend_from_slice(&[KIND_NET, HOST_MAC, (frame.data.len() + 2) as u8])
            .ok());
        unwrap!(buf.push(frame.src.into_u8()).ok());
        unwrap!(buf.push(frame.dst.into_u8()).ok());
        unwrap!(buf.extend_from_slice(&frame.data).ok());
        let crc = Crc16::sum(&buf[start..]);
        unwrap!(buf.extend_from_slice(&crc.to_le_bytes()).ok());
    }

    /// One fill pass: drains host-bound sources into transfer buffers in
    /// priority order until the sources are empty or the buffers are full.
    ///
    /// Pass-thru modes forward bus-rx frames first, then queued host-ward
    /// frames; raw mode copies tunnel packet payloads verbatim. Every
    /// serialized unit returns to its pool.
    pub fn poll_fill<B, const FN: usize, const PN: usize, const HN: usize, const RN: usize>(
        &mut self,
        cfg: &BridgeConfig,
        bus: &mut B,
        host_frames: &Queue<M, Frame, HN>,
        raw_host: &Queue<M, Packet, RN>,
        frame_pool: &Pool<M, Frame, FN>,
        packet_pool: &Pool<M, Packet, PN>,
    ) where
        B: BusLink,
    {
        if cfg.mode == Mode::Raw {
            loop {
                let Some(pkt) = raw_host.pop_front() else { break };
                if !self.ensure_room(pkt.data.len()) {
                    unwrap!(raw_host.push_front(pkt).ok());
                    return;
                }
                let buf = unwrap!(self.current.as_mut());
                unwrap!(buf.extend_from_slice(&pkt.data).ok());
                trace!("raw -> host: {} bytes", pkt.data.len());
                packet_pool.release(pkt);
            }
            return;
        }

        loop {
            let frame = match self.pending_bus.take() {
                Some(frame) => frame,
                None => match bus.pop_rx() {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if !self.ensure_room(frame.wire_len() + FRAME_CRC_LEN) {
                self.pending_bus = Some(frame);
                return;
            }
            let buf = unwrap!(self.current.as_mut());
            Self::encap(buf, &frame);
            trace!("bus -> host: dat len {}", frame.data.len());
            frame_pool.release(frame);
        }

        loop {
            let Some(frame) = host_frames.pop_front() else { break };
            if !self.ensure_room(frame.wire_len()) {
                unwrap!(host_frames.push_front(frame).ok());
                return;
            }
            let buf = unwrap!(self.current.as_mut());
            unwrap!(frame.encode(buf).ok());
            trace!("local -> host: dat len {}", frame.data.len());
            frame_pool.release(frame);
        }
    }

    /// Hands the next buffer to the host link once it reports idle.
    ///
    /// A ready buffer wins over the partially filled one; the partial buffer
    /// is sent only when nothing complete is waiting, keeping latency bounded
    /// without fragmenting a busy stream.
    pub fn poll_tx<H: HostTx>(&mut self, host: &mut H) {
        if host.is_busy() {
            return;
        }
        if let Some(done) = self.inflight.take() {
            self.free.release(done);
        }

        let next = match self.ready.pop_front() {
            Some(buf) => Some(buf),
            None => match &self.current {
                Some(buf) if !buf.is_empty() => self.current.take(),
                _ => None,
            },
        };
        let Some(buf) = next else { return };

        match host.send(&buf) {
            Ok(()) => {
                trace!("host tx: {} bytes", buf.len());
                self.inflight = Some(buf);
            }
            Err(_) => {
                warn!("host tx: send failed, drop {} bytes", buf.len());
                self.free.release(buf);
            }
        }
    }
}

impl<M: RawMutex> Default for HostMux<M> {
    fn default() -> Self {
        Self::new()
    }
}
