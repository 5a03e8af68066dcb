//! CDBUS frame object

use cdbridge_core::{Crc16, Mac, FRAME_HEADER_LEN, FRAME_OVERHEAD, MAX_FRAME_PAYLOAD};
use heapless::Vec;

/// The target does not have room for the encoded frame.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Overflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    Truncated,
    LengthMismatch,
    BadCrc,
}

/// One bus-level protocol unit
///
/// Wire image: `[src][dst][len][payload…][crc16_le]`. The CRC trailer exists
/// only on the wire; a pooled frame carries header and payload.
///
/// Single ownership is enforced by move semantics: a frame lives in exactly
/// one pool, queue, or local variable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub src: Mac,
    pub dst: Mac,
    pub data: Vec<u8, MAX_FRAME_PAYLOAD>,
}

impl Frame {
    pub fn new(src: Mac, dst: Mac) -> Self {
        Self {
            src,
            dst,
            data: Vec::new(),
        }
    }

    /// Length of the wire image, CRC trailer included.
    pub fn wire_len(&self) -> usize {
        self.data.len() + FRAME_OVERHEAD
    }

    /// Appends the wire image to `out`, computing a fresh CRC trailer.
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), Overflow> {
        if N - out.len() < self.wire_len() {
            return Err(Overflow);
        }

        let start = out.len();
        out.extend_from_slice(&[
            self.src.into_u8(),
            self.dst.into_u8(),
            self.data.len() as u8,
        ])
        .map_err(|_| Overflow)?;
        out.extend_from_slice(&self.data).map_err(|_| Overflow)?;

        let crc = Crc16::sum(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes()).map_err(|_| Overflow)
    }

    /// Parses one wire image, validating length and CRC.
    pub fn decode(wire: &[u8]) -> Result<Self, FrameError> {
        if wire.len() < FRAME_OVERHEAD {
            return Err(FrameError::Truncated);
        }
        let payload_len = usize::from(wire[2]);
        if payload_len > MAX_FRAME_PAYLOAD || wire.len() != payload_len + FRAME_OVERHEAD {
            return Err(FrameError::LengthMismatch);
        }
        if Crc16::sum(wire) != 0 {
            return Err(FrameError::BadCrc);
        }

        let mut frame = Frame::new(Mac::new(wire[0]), Mac::new(wire[1]));
        // Length checked above
        let _ = frame
            .data
            .extend_from_slice(&wire[FRAME_HEADER_LEN..FRAME_HEADER_LEN + payload_len]);
        Ok(frame)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new(Mac::new(0), Mac::new(0))
    }
}
