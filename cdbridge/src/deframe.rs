//! Pass-thru stream deframer
//!
//! Recovers host-side frames from a continuous byte stream delivered in
//! arbitrary chunks (DMA ring spans or CDC buffers). Host frame image:
//!
//! ```text
//! [0xAA][kind][len][body: len bytes][crc16_le]
//! ```
//!
//! `kind` `0x55` carries a bare bus frame body (`[src][dst][plen][payload…]`)
//! forwarded verbatim onto the bus; `0x56` carries `[src][dst][payload…]`
//! and is decapsulated into a bus frame. The CRC16 covers the whole image,
//! so a valid image sums to zero with the trailer included.
//!
//! The parser resynchronizes on any mismatch by rescanning from the next
//! byte, and discards a partially accumulated frame after a configurable
//! quiet period, which bounds recovery time when the host disconnects
//! mid-frame.

use heapless::Vec;

use crate::config::BridgeConfig;
use crate::core::{Crc16, Mac, FRAME_HEADER_LEN, FRAME_OVERHEAD, MAX_FRAME_PAYLOAD};
use crate::frame::Frame;
use crate::link::BusLink;
use crate::pool::Pool;
use crate::time::Instant;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// First byte of every host-side frame (the host's bus address).
pub const HOST_MAC: u8 = 0xaa;
/// Kind byte: bare bus frame, forwarded verbatim.
pub const KIND_BUS: u8 = 0x55;
/// Kind byte: CDNET-encapsulated frame, decapsulated before bus transmission.
pub const KIND_NET: u8 = 0x56;

const WIRE_MAX: usize = MAX_FRAME_PAYLOAD + FRAME_OVERHEAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekPrefix,
    SeekKind,
    SeekLen,
    Body { total: usize },
}

pub struct Deframer {
    state: State,
    buf: Vec<u8, WIRE_MAX>,
    t_last: Instant,
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            state: State::SeekPrefix,
            buf: Vec::new(),
            t_last: Instant::MIN,
        }
    }

    /// True while a frame is partially accumulated.
    pub fn is_mid_frame(&self) -> bool {
        self.state != State::SeekPrefix
    }

    fn reseek(&mut self) {
        self.state = State::SeekPrefix;
        self.buf.clear();
    }

    /// Consumes one span of host bytes.
    ///
    /// Complete, CRC-valid frames are routed bus-ward through `bus`; each
    /// consumes one pool frame, and pool or driver-queue exhaustion drops the
    /// unit with a log entry.
    pub fn feed<M, B, const FN: usize>(
        &mut self,
        bytes: &[u8],
        now: Instant,
        cfg: &BridgeConfig,
        pool: &Pool<M, Frame, FN>,
        bus: &mut B,
    ) where
        M: RawMutex,
        B: BusLink,
    {
        if self.is_mid_frame() && now > self.t_last + cfg.frame_idle {
            warn!("pass-thru <- host: drop partial frame on idle");
            self.reseek();
        }
        if bytes.is_empty() {
            return;
        }
        self.t_last = now;

        for &byte in bytes {
            self.push_byte(byte, pool, bus);
        }
    }

    fn push_byte<M, B, const FN: usize>(&mut self, byte: u8, pool: &Pool<M, Frame, FN>, bus: &mut B)
    where
        M: RawMutex,
        B: BusLink,
    {
        match self.state {
            State::SeekPrefix => {
                if byte == HOST_MAC {
                    unwrap!(self.buf.push(byte));
                    self.state = State::SeekKind;
                }
            }
            State::SeekKind => match byte {
                KIND_BUS | KIND_NET => {
                    unwrap!(self.buf.push(byte));
                    self.state = State::SeekLen;
                }
                // The mismatched byte may itself start a frame.
                HOST_MAC => {}
                _ => self.reseek(),
            },
            State::SeekLen => {
                if usize::from(byte) > MAX_FRAME_PAYLOAD {
                    warn!("pass-thru <- host: bad len {}", byte);
                    self.reseek();
                    return;
                }
                unwrap!(self.buf.push(byte));
                self.state = State::Body {
                    total: usize::from(byte) + FRAME_OVERHEAD,
                };
            }
            State::Body { total } => {
                unwrap!(self.buf.push(byte));
                if self.buf.len() == total {
                    if Crc16::sum(&self.buf) == 0 {
                        self.route(pool, bus);
                    } else {
                        warn!("pass-thru <- host: crc error, len {}", total);
                    }
                    self.reseek();
                }
            }
        }
    }

    /// Converts the accumulated image into a bus frame and queues it.
    fn route<M, B, const FN: usize>(&mut self, pool: &Pool<M, Frame, FN>, bus: &mut B)
    where
        M: RawMutex,
        B: BusLink,
    {
        let kind = self.buf[1];
        let body = &self.buf[FRAME_HEADER_LEN..self.buf.len() - Crc16::LENGTH];

        let Some(mut frame) = pool.acquire() else {
            error!("pass-thru <- host: no free frame");
            return;
        };
        frame.data.clear();

        match kind {
            KIND_BUS => {
                // Body is a full frame image minus the CRC trailer.
                if body.len() < FRAME_HEADER_LEN || usize::from(body[2]) != body.len() - FRAME_HEADER_LEN {
                    warn!("pass-thru <- host: 55 len mismatch");
                    pool.release(frame);
                    return;
                }
                frame.src = Mac::new(body[0]);
                frame.dst = Mac::new(body[1]);
                unwrap!(frame.data.extend_from_slice(&body[FRAME_HEADER_LEN..]).ok());
            }
            KIND_NET => {
                // First two body bytes address the bus frame; the rest is payload.
                if body.len() < 2 {
                    warn!("pass-thru <- host: 56 too short");
                    pool.release(frame);
                    return;
                }
                frame.src = Mac::new(body[0]);
                frame.dst = Mac::new(body[1]);
                unwrap!(frame.data.extend_from_slice(&body[2..]).ok());
            }
            _ => unreachable!(),
        }

        trace!("pass-thru <- host: {} dat len {}", kind, frame.data.len());
        if let Err(frame) = bus.push_tx(frame) {
            warn!("pass-thru <- host: bus tx full");
            pool.release(frame);
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}
