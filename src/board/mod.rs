//! Target board bindings.

#[cfg(feature = "esp32")]
pub mod esp32;

#[cfg(feature = "esp32")]
pub use esp32::{open_transport, BoardError, Esp32Gdo, Esp32Transport, MisoLevel, SpiPins};
