//! Host simulator: a register-level CC110x model whose air interface is
//! an Ethernet tunnel.
//!
//! ```text
//!   Cc110x driver ──SPI──▶ SimulatedChip ──encapsulate──▶ FrameSink (TAP / memory)
//!                              ▲
//!   TAP / memory ──▶ TunnelPump ┘ (decapsulate, channel + address filter)
//! ```

pub mod chip;
pub mod io;
#[cfg(test)]
mod scenarios;
#[cfg(all(feature = "tap", target_os = "linux"))]
pub mod tap;
pub mod tunnel;

pub use chip::{SimConfig, SimError, SimStats, SimulatedChip};
pub use io::{Delivery, FrameSink, MemoryLink, MemoryPort, PumpStats, TunnelPump};
#[cfg(all(feature = "tap", target_os = "linux"))]
pub use tap::{TapDevice, TapError, TapWriter};
pub use tunnel::{decapsulate, encapsulate, TunnelConfig, TunnelError, TunnelFrame};
