//! CC110x sub-GHz transceiver driver.
//!
//! This module contains:
//! - [`regs`]: register map, strobes, MARC states, default configuration
//! - [`header`]: SPI header byte encoding and address classification
//! - [`fifo`]: fixed-capacity FIFO model
//! - [`packet`]: packet layout and appended status bytes
//! - [`state`]: driver-visible state machine
//! - [`bus`]: mutex-guarded SPI bus with chip-select framed transactions
//! - [`hal`]: `embedded-hal` SPI transport
//! - [`irq`]: GDO interrupt lines
//! - [`config`]: board wiring and radio settings
//! - [`device`]: driver façade
//! - [`dispatcher`]: interrupt mailbox and event worker

pub mod bus;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod fifo;
pub mod hal;
pub mod header;
pub mod irq;
pub mod packet;
pub mod regs;
pub mod state;

pub use bus::{SharedBus, SpiTransport};
pub use config::{Cc110xParams, RadioSettings, SettingsError};
pub use device::{Cc110x, ConfigReport, RadioError, RadioResult};
pub use dispatcher::{
    mailbox, IsrStats, Mailbox, MailboxError, MailboxHandle, RadioEvent, RadioMessage, Worker,
    WorkerStats, MAILBOX_DEPTH,
};
pub use fifo::{Fifo, FifoError, HwFifo};
pub use hal::{HalError, HalTransport};
pub use header::{AccessMode, ProtocolFault, SpiHeader, Target};
pub use irq::{Edge, Gdo, InterruptSink, IrqControl, SoftIrqLines};
pub use packet::{Packet, PacketError, ReceivedPacket, HEADER_LENGTH, MAX_DATA_LENGTH};
pub use regs::{Band, MarcState, Strobe};
pub use state::{IllegalTransition, RadioMode, RadioState, Transition};
