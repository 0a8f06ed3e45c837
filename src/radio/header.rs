//! SPI header byte encoding and address-space classification.
//!
//! Every transaction starts with a header byte: the upper two bits select
//! read/write and single/burst, the lower six bits are the address.

use super::regs::{
    Strobe, ADDRESS_MASK, FIFO, FIRST_STROBE, LAST_CONFIG_REGISTER, LAST_STROBE, PATABLE,
    READ_BURST, READ_SINGLE, WRITE_BURST, WRITE_SINGLE,
};
use std::fmt;

/// Access mode carried in the top two bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    WriteSingle,
    WriteBurst,
    ReadSingle,
    ReadBurst,
}

impl AccessMode {
    fn bits(self) -> u8 {
        match self {
            Self::WriteSingle => WRITE_SINGLE,
            Self::WriteBurst => WRITE_BURST,
            Self::ReadSingle => READ_SINGLE,
            Self::ReadBurst => READ_BURST,
        }
    }

    /// True for the two read modes.
    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadSingle | Self::ReadBurst)
    }

    /// True for the two burst modes.
    pub fn is_burst(self) -> bool {
        matches!(self, Self::WriteBurst | Self::ReadBurst)
    }
}

/// A decoded SPI header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiHeader {
    address: u8,
    mode: AccessMode,
}

impl SpiHeader {
    /// Build a header. Address bits above the 6-bit field are dropped.
    pub fn new(address: u8, mode: AccessMode) -> Self {
        Self {
            address: address & ADDRESS_MASK,
            mode,
        }
    }

    /// Decode a raw header byte. Every byte value is a valid header.
    pub fn decode(byte: u8) -> Self {
        let mode = match byte & !ADDRESS_MASK {
            WRITE_SINGLE => AccessMode::WriteSingle,
            WRITE_BURST => AccessMode::WriteBurst,
            READ_SINGLE => AccessMode::ReadSingle,
            _ => AccessMode::ReadBurst,
        };
        Self::new(byte, mode)
    }

    /// Encode to the byte sent on the wire.
    pub fn encode(self) -> u8 {
        self.address | self.mode.bits()
    }

    pub fn address(self) -> u8 {
        self.address
    }

    pub fn mode(self) -> AccessMode {
        self.mode
    }

    /// Classify the target of this header.
    ///
    /// Reads in the strobe window address status registers, writes there
    /// are strobes. The FIFO address selects the RX FIFO on read and the
    /// TX FIFO on write.
    pub fn target(self) -> Result<Target, ProtocolFault> {
        let addr = self.address;
        let read = self.mode.is_read();
        match addr {
            0..=LAST_CONFIG_REGISTER => Ok(Target::Config(addr)),
            FIRST_STROBE..=LAST_STROBE if read => Ok(Target::Status(addr)),
            FIRST_STROBE..=LAST_STROBE => Strobe::from_address(addr)
                .map(Target::Strobe)
                .ok_or(ProtocolFault::InvalidAddress(addr)),
            PATABLE => Ok(Target::PaTable),
            FIFO if read => Ok(Target::RxFifo),
            FIFO => Ok(Target::TxFifo),
            _ => Err(ProtocolFault::InvalidAddress(addr)),
        }
    }
}

impl fmt::Display for SpiHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({:?} @ {:#04x})", self.encode(), self.mode, self.address)
    }
}

/// What a header addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Configuration register 0x00-0x2E.
    Config(u8),
    /// Status register 0x30-0x3D (reads only).
    Status(u8),
    /// Command strobe (writes only).
    Strobe(Strobe),
    /// PA power table.
    PaTable,
    /// TX FIFO (writes to 0x3F).
    TxFifo,
    /// RX FIFO (reads from 0x3F).
    RxFifo,
}

/// Violation of the SPI register protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFault {
    /// Address outside every register region.
    InvalidAddress(u8),
    /// Byte clocked while the chip is not selected.
    NotSelected,
    /// Write to the TX FIFO while it is full.
    TxFifoOverflow,
    /// Read from the RX FIFO while it is empty.
    RxFifoUnderflow,
}

impl fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(f, "protocol fault: invalid address {:#04x}", addr),
            Self::NotSelected => write!(f, "protocol fault: transfer without chip select"),
            Self::TxFifoOverflow => write!(f, "protocol fault: TX FIFO overflow"),
            Self::RxFifoUnderflow => write!(f, "protocol fault: RX FIFO underflow"),
        }
    }
}

impl std::error::Error for ProtocolFault {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::regs::{CHANNR, MARCSTATE, RXBYTES};
    use cc110x_rs_macros::device_test;

    #[device_test]
    fn encode_sets_mode_bits() {
        assert_eq!(SpiHeader::new(CHANNR, AccessMode::WriteSingle).encode(), 0x0A);
        assert_eq!(SpiHeader::new(CHANNR, AccessMode::WriteBurst).encode(), 0x4A);
        assert_eq!(SpiHeader::new(CHANNR, AccessMode::ReadSingle).encode(), 0x8A);
        assert_eq!(SpiHeader::new(RXBYTES, AccessMode::ReadBurst).encode(), 0xFB);
    }

    #[device_test]
    fn decode_inverts_encode() {
        for byte in 0..=u8::MAX {
            assert_eq!(SpiHeader::decode(byte).encode(), byte);
        }
    }

    #[device_test]
    fn strobe_window_depends_on_direction() {
        let read = SpiHeader::new(MARCSTATE, AccessMode::ReadBurst);
        assert_eq!(read.target(), Ok(Target::Status(MARCSTATE)));

        let write = SpiHeader::new(0x36, AccessMode::WriteSingle);
        assert_eq!(write.target(), Ok(Target::Strobe(Strobe::Sidle)));
    }

    #[device_test]
    fn fifo_address_depends_on_direction() {
        assert_eq!(
            SpiHeader::new(FIFO, AccessMode::ReadBurst).target(),
            Ok(Target::RxFifo)
        );
        assert_eq!(
            SpiHeader::new(FIFO, AccessMode::WriteBurst).target(),
            Ok(Target::TxFifo)
        );
        assert_eq!(
            SpiHeader::new(PATABLE, AccessMode::WriteBurst).target(),
            Ok(Target::PaTable)
        );
    }

    #[device_test]
    fn gap_address_is_rejected() {
        for mode in [
            AccessMode::WriteSingle,
            AccessMode::WriteBurst,
            AccessMode::ReadSingle,
            AccessMode::ReadBurst,
        ] {
            assert_eq!(
                SpiHeader::new(0x2F, mode).target(),
                Err(ProtocolFault::InvalidAddress(0x2F))
            );
        }
    }
}
