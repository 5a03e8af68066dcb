//! # cdbridge
//!
//! This library implements the protocol engine of a CDBUS/CDNET bridge: a
//! device that connects a host (USB CDC or a UART link) to a CDBUS multidrop
//! serial bus and to CDNET, the lightweight addressed packet protocol running
//! over it. It uses fixed-capacity object pools and queues, requiring no
//! dynamic memory allocation, and is designed for a single cooperative main
//! loop concurrent only with driver interrupt handlers.
//!
//! ## Architecture
//!
//! ```text
//!              host bytes (DMA ring / CDC buffers)
//!                   │                      ▲
//!                   ▼                      │
//!        ┌──────────────────┐      ┌──────────────┐
//!        │ Deframer (0xAA…) │      │   HostMux    │
//!        │ or RawAggregator │      │ (512B bufs)  │
//!        └───────┬──────────┘      └──▲───────▲───┘
//!                │ Frame/Packet pools │       │
//!                ▼                    │       │
//!        ┌──────────────┐   bus rx ───┘  raw/pass-thru
//!        │   BusLink    │                 host queues
//!        └──────────────┘                     ▲
//!                ▲                            │
//!                │    ┌─────────────┐   ┌──────────┐
//!                └────┤   NetLink   ├──►│ Services │
//!                     └─────────────┘   │ p1/2/3/10│
//!                                       └──────────┘
//! ```
//!
//! Components:
//! * [`pool`]: fixed-capacity pools and FIFO queues shared between the loop
//!   and interrupt context. Ownership moves with the object, so a unit is
//!   never linked into two places at once.
//! * [`deframe`]: the pass-thru mode stream parser: recovers
//!   `[0xAA][0x55|0x56]` framed units from the host byte stream, validates
//!   CRC16, and routes them bus-ward (verbatim or CDNET-decapsulated).
//! * [`aggregate`]: the raw mode packet aggregator: accumulates host bytes
//!   into CDNET packets toward the configured report peer, flushing on size
//!   or quiet period.
//! * [`service`]: the port service dispatcher: device identify, address and
//!   baud configuration, raw report configuration, and the flash
//!   erase/read/write sub-protocol.
//! * [`mux`]: the output multiplexer: drains bus-received and locally
//!   generated host-ward traffic into bounded transfer buffers under host
//!   link backpressure.
//! * [`bridge`]: the controller tying everything together once per loop
//!   iteration.
//!
//! ## Concurrency model
//!
//! There is no executor and nothing blocks. The bridge is polled from one
//! main loop; driver interrupt handlers may acquire and release pool objects
//! concurrently. Every pool and queue guards its container with an
//! `embassy_sync` blocking mutex, generic over the `RawMutex`
//! implementation; firmware picks `CriticalSectionRawMutex`, keeping each
//! critical section to a single container operation. Parsing and service
//! logic always run outside critical sections.
//!
//! Backpressure is the liveness mechanism: every resource is bounded and
//! every acquisition failure drops the newest unit of work with a log entry,
//! never stalling the loop.
#![no_std]

pub use cdbridge_core as core;
pub use cdbridge_driver::{frame, link, nvm, packet, time};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod aggregate;
pub mod bridge;
pub mod config;
pub mod deframe;
pub mod mux;
pub mod pool;
pub mod service;
