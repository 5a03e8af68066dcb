//! CDBUS/CDNET core data types
//!
//! This crate provides basic data type definitions used by other cdbridge crates.
//! Bridge users should not depend on this crate directly. Use the `cdbridge::core`
//! reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Longest payload of a CDBUS frame.
pub const MAX_FRAME_PAYLOAD: usize = 250;

/// Longest payload of a CDNET level-0/1 packet.
pub const MAX_PACKET_PAYLOAD: usize = 243;

/// Frame wire overhead: 3 header bytes plus the CRC16 trailer.
pub const FRAME_HEADER_LEN: usize = 3;
pub const FRAME_CRC_LEN: usize = 2;
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_LEN + FRAME_CRC_LEN;

/// CDBUS node address: one byte per node on a multidrop segment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mac(u8);

impl Mac {
    pub const BROADCAST: Mac = Mac(0xff);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }
}

impl From<u8> for Mac {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Mac> for u8 {
    fn from(value: Mac) -> Self {
        value.into_u8()
    }
}

/// CDNET address: network id plus node MAC.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetAddr {
    pub net: u8,
    pub mac: Mac,
}

impl NetAddr {
    pub const fn new(net: u8, mac: Mac) -> Self {
        Self { net, mac }
    }
}

impl Default for NetAddr {
    fn default() -> Self {
        Self::new(0, Mac::new(0))
    }
}

/// CDNET port
///
/// Ports below [`Port::DEF`] are reserved for system services; `DEF` itself is
/// the default source port of regular clients. A request is well-formed when
/// `src_port >= DEF && dst_port < DEF`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Port(u16);

impl Port {
    /// Default client port, also the reserved-port threshold.
    pub const DEF: Port = Port(0xcdcd);

    /// Device identification string service.
    pub const IDENTIFY: Port = Port(1);
    /// Bus baud rate get/set service (reserved).
    pub const BAUD_RATE: Port = Port(2);
    /// Node address / network id configuration service.
    pub const ADDRESS: Port = Port(3);
    /// Remote flash erase/read/write service.
    pub const FLASH: Port = Port(10);
    /// Raw-mode tunnel data port.
    pub const RAW_SER: Port = Port(20);
    /// Raw-mode report configuration port.
    pub const RAW_CONF: Port = Port(21);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    pub const fn is_system(self) -> bool {
        self.0 < Self::DEF.0
    }
}

impl From<u16> for Port {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Port> for u16 {
    fn from(value: Port) -> Self {
        value.into_u16()
    }
}

/// CDNET addressing scope
///
/// The type has explicit numeric encoding matching the two level bits of the
/// packet header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Level {
    /// Node-local: single segment, MAC addressing only.
    L0 = 0,
    /// Net-local: adds network ids and full port addressing.
    L1 = 1,
    /// Raw level-2 traffic; the bridge does not service it.
    L2 = 2,
}

impl Level {
    pub const fn from_u8_truncating(code: u8) -> Level {
        match code & 0x3 {
            0 => Level::L0,
            1 => Level::L1,
            _ => Level::L2,
        }
    }

    pub const fn try_from_u8(code: u8) -> Option<Level> {
        match code {
            0 => Some(Level::L0),
            1 => Some(Level::L1),
            2 => Some(Level::L2),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Level {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// CDBUS frame CRC16 (the Modbus variant)
///
/// Reflected polynomial `0xa001`, init `0xffff`, little-endian trailer.
/// Feeding a valid frame including its own trailer yields zero.
#[derive(Debug, Clone, Copy)]
pub struct Crc16(u16);

impl Default for Crc16 {
    fn default() -> Self {
        Self(Self::INIT_VALUE)
    }
}

impl Crc16 {
    pub const LENGTH: usize = FRAME_CRC_LEN;
    const INIT_VALUE: u16 = 0xffff;
    const POLYNOMIAL: u16 = 0xa001;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, byte: u8) {
        self.0 ^= u16::from(byte);
        for _bit in 0..8 {
            if (self.0 & 0x0001) != 0 {
                self.0 = (self.0 >> 1) ^ Self::POLYNOMIAL;
            } else {
                self.0 >>= 1;
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    pub fn get(&self) -> u16 {
        self.0
    }

    /// One-shot CRC of a byte slice.
    pub fn sum(bytes: &[u8]) -> u16 {
        let mut crc = Self::new();
        crc.add_bytes(bytes);
        crc.get()
    }
}

impl From<u16> for Crc16 {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
