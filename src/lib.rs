//! CC110x sub-GHz transceiver driver with a host simulator.
//!
//! - [`radio`]: register map, SPI protocol, driver façade and the
//!   interrupt-driven event worker. Platform independent.
//! - [`sim`]: register-level chip model whose air interface is an
//!   Ethernet/IPv4/UDP/ZEP tunnel over a TAP device.
//! - `board`: ESP32 SPI and GPIO bindings (`esp32` feature).

// Lets proc-macro generated code name the crate from inside it.
extern crate self as cc110x_rs;

pub mod board;
pub mod radio;
pub mod sim;
#[cfg(feature = "tap-tests")]
pub mod testing;

pub use radio::{
    mailbox, Cc110x, Cc110xParams, Packet, RadioError, RadioEvent, RadioMessage, RadioSettings,
    RadioState, SharedBus, SoftIrqLines, SpiTransport, Worker,
};
pub use sim::{MemoryLink, SimConfig, SimulatedChip, TunnelConfig, TunnelPump};

#[cfg(feature = "tap-tests")]
pub use testing::TestRunner;
