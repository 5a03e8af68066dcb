//! Bridge configuration
//!
//! Single-writer state: only the port-3 and raw-conf service handlers mutate
//! it at run time; every poll call reads it through a shared reference.
//! Timeouts are plain fields so each host link variant can tune them.

use crate::core::{Level, Mac, NetAddr};
use crate::time::Duration;

/// Bridge operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Legacy revision of pass-thru. Same data path as [`Mode::PassThru`];
    /// the port-3 service speaks the older tagged dialect.
    Bridge,
    /// Host exchanges an opaque byte stream tunneled as CDNET packets to one
    /// configured peer.
    Raw,
    /// Host sees raw bus/CDNET traffic through the framed byte-stream
    /// encapsulation.
    PassThru,
}

/// Active host-facing link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HostPort {
    Usb = 0,
    Ttl = 1,
    Rs232 = 2,
}

/// Interface id of the RS485 bus in the legacy port-3 dialect.
pub const INTF_RS485: u8 = 3;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    pub mode: Mode,
    pub host_port: HostPort,
    /// Bus-side CDNET address of the bridge itself.
    pub local: NetAddr,

    /// Raw-mode report stream enabled.
    pub rpt_en: bool,
    /// Raw-mode report destination.
    pub rpt_dst: NetAddr,
    pub rpt_mac: Mac,
    pub rpt_level: Level,
    pub rpt_seq: bool,
    pub rpt_multi_net: bool,
    pub rpt_multicast: bool,

    /// Quiet period after which a partially accumulated pass-thru frame is
    /// discarded and the parser reseeks.
    pub frame_idle: Duration,
    /// Quiet period after which a partially filled raw packet is flushed.
    /// UART host links typically use a shorter value than USB.
    pub raw_flush_idle: Duration,

    /// Device unique id, rendered into the identify string.
    pub uid: [u8; 12],
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::PassThru,
            host_port: HostPort::Usb,
            local: NetAddr::new(0, Mac::new(254)),
            rpt_en: false,
            rpt_dst: NetAddr::default(),
            rpt_mac: Mac::new(0),
            rpt_level: Level::L0,
            rpt_seq: false,
            rpt_multi_net: false,
            rpt_multicast: false,
            frame_idle: Duration::from_micros(500),
            raw_flush_idle: Duration::from_micros(2000),
            uid: [0; 12],
        }
    }
}
