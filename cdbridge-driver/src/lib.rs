//! cdbridge driver interface
//!
//! The crate provides the interface between platform drivers and the cdbridge
//! stack. Limited scope facilitates compatibility across versions.
//! Driver crates should depend on this crate. Bridge users should depend on
//! the `cdbridge` crate instead.
//!
//! The bridge core consumes four collaborator interfaces:
//! * [`link::BusLink`]: the CDBUS controller transaction layer
//! * [`link::NetLink`]: the CDNET codec layered over a frame transport
//! * [`link::HostTx`]: the host-facing transmit primitive (USB CDC or UART DMA)
//! * [`nvm::Nvm`]: non-volatile memory programming primitives
//!
//! All interfaces are polled by the cooperative bridge loop and must never
//! block. Backpressure is expressed by returning the rejected object to the
//! caller, which drops it and logs.

#![no_std]

pub mod frame;
pub mod link;
pub mod nvm;
pub mod packet;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
