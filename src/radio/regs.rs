//! CC110x register map, command strobes and fixed constants.
//!
//! The chip exposes a 6-bit address space, partitioned as follows:
//!
//! | Address     | Write            | Read             |
//! |-------------|------------------|------------------|
//! | 0x00 - 0x2E | config register  | config register  |
//! | 0x2F        | (invalid)        | (invalid)        |
//! | 0x30 - 0x3D | command strobe   | status register  |
//! | 0x3E        | PATABLE          | PATABLE          |
//! | 0x3F        | TX FIFO          | RX FIFO          |

use std::fmt;

// ==================== Access flags ====================

/// Header flag: single-byte write.
pub const WRITE_SINGLE: u8 = 0x00;
/// Header flag: burst write.
pub const WRITE_BURST: u8 = 0x40;
/// Header flag: single-byte read.
pub const READ_SINGLE: u8 = 0x80;
/// Header flag: burst read (also selects status registers at 0x30-0x3D).
pub const READ_BURST: u8 = 0xC0;
/// Mask of the address bits in a header byte.
pub const ADDRESS_MASK: u8 = 0x3F;

// ==================== Configuration registers ====================

pub const IOCFG2: u8 = 0x00;
pub const IOCFG1: u8 = 0x01;
pub const IOCFG0: u8 = 0x02;
pub const FIFOTHR: u8 = 0x03;
pub const SYNC1: u8 = 0x04;
pub const SYNC0: u8 = 0x05;
pub const PKTLEN: u8 = 0x06;
pub const PKTCTRL1: u8 = 0x07;
pub const PKTCTRL0: u8 = 0x08;
pub const ADDR: u8 = 0x09;
pub const CHANNR: u8 = 0x0A;
pub const FSCTRL1: u8 = 0x0B;
pub const FSCTRL0: u8 = 0x0C;
pub const FREQ2: u8 = 0x0D;
pub const FREQ1: u8 = 0x0E;
pub const FREQ0: u8 = 0x0F;
pub const MDMCFG4: u8 = 0x10;
pub const MDMCFG3: u8 = 0x11;
pub const MDMCFG2: u8 = 0x12;
pub const MDMCFG1: u8 = 0x13;
pub const MDMCFG0: u8 = 0x14;
pub const DEVIATN: u8 = 0x15;
pub const MCSM2: u8 = 0x16;
pub const MCSM1: u8 = 0x17;
pub const MCSM0: u8 = 0x18;
pub const FOCCFG: u8 = 0x19;
pub const BSCFG: u8 = 0x1A;
pub const AGCCTRL2: u8 = 0x1B;
pub const AGCCTRL1: u8 = 0x1C;
pub const AGCCTRL0: u8 = 0x1D;
pub const WOREVT1: u8 = 0x1E;
pub const WOREVT0: u8 = 0x1F;
pub const WORCTRL: u8 = 0x20;
pub const FREND1: u8 = 0x21;
pub const FREND0: u8 = 0x22;
pub const FSCAL3: u8 = 0x23;
pub const FSCAL2: u8 = 0x24;
pub const FSCAL1: u8 = 0x25;
pub const FSCAL0: u8 = 0x26;
pub const RCCTRL1: u8 = 0x27;
pub const RCCTRL0: u8 = 0x28;
pub const FSTEST: u8 = 0x29;
pub const PTEST: u8 = 0x2A;
pub const AGCTEST: u8 = 0x2B;
pub const TEST2: u8 = 0x2C;
pub const TEST1: u8 = 0x2D;
pub const TEST0: u8 = 0x2E;

/// Highest valid configuration register address.
pub const LAST_CONFIG_REGISTER: u8 = TEST0;
/// Number of configuration registers.
pub const CONFIG_REGISTER_COUNT: usize = LAST_CONFIG_REGISTER as usize + 1;

// ==================== Status registers (read with burst bit) ====================

pub const PARTNUM: u8 = 0x30;
pub const VERSION: u8 = 0x31;
pub const FREQEST: u8 = 0x32;
pub const LQI: u8 = 0x33;
pub const RSSI: u8 = 0x34;
pub const MARCSTATE: u8 = 0x35;
pub const WORTIME1: u8 = 0x36;
pub const WORTIME0: u8 = 0x37;
pub const PKTSTATUS: u8 = 0x38;
pub const VCO_VC_DAC: u8 = 0x39;
pub const TXBYTES: u8 = 0x3A;
pub const RXBYTES: u8 = 0x3B;
pub const RCCTRL1_STATUS: u8 = 0x3C;
pub const RCCTRL0_STATUS: u8 = 0x3D;

/// First address of the strobe / status window.
pub const FIRST_STROBE: u8 = 0x30;
/// Last address of the strobe / status window.
pub const LAST_STROBE: u8 = 0x3D;

// ==================== Multi-byte registers ====================

/// PA power table (8 entries).
pub const PATABLE: u8 = 0x3E;
/// FIFO window: TX FIFO on write, RX FIFO on read.
pub const FIFO: u8 = 0x3F;

/// Number of PATABLE entries.
pub const PATABLE_SIZE: usize = 8;

// ==================== Field masks ====================

/// RXBYTES / TXBYTES: byte count.
pub const NUM_BYTES_MASK: u8 = 0x7F;
/// RXBYTES: RX FIFO overflowed. TXBYTES: TX FIFO underflowed.
pub const FIFO_ERROR_FLAG: u8 = 0x80;
/// MARCSTATE: state bits.
pub const MARCSTATE_MASK: u8 = 0x1F;
/// Appended status byte 2: CRC OK flag.
pub const CRC_OK: u8 = 0x80;
/// Appended status byte 2: link quality estimate.
pub const LQI_EST: u8 = 0x7F;

// ==================== Geometry and limits ====================

/// Hardware FIFO depth (each direction).
pub const FIFO_SIZE: usize = 64;
/// Bytes moved per burst when a frame is larger than the FIFO.
pub const FIFO_CHUNK: usize = 60;
/// RX FIFO threshold programmed by `FIFOTHR_DEFAULT` (bytes).
pub const RX_FIFO_THRESHOLD: usize = 60;
/// Number of status bytes appended to a received frame (RSSI, LQI|CRC).
pub const STATUS_BYTES: usize = 2;
/// Largest frame (length byte included) the driver moves through the FIFO.
pub const MAX_FRAME_LENGTH: usize = 256;
/// Highest channel number (register value is `channel * CHANNEL_SPACING`).
pub const MAX_CHANNEL: u8 = 24;
/// Channel number to CHANNR multiplier.
pub const CHANNEL_SPACING: u8 = 10;
/// Lowest assignable node address.
pub const MIN_ADDRESS: u16 = 1;
/// Highest assignable node address.
pub const MAX_ADDRESS: u16 = 255;
/// Broadcast destination address.
pub const BROADCAST_ADDRESS: u8 = 0;

// ==================== Mode register values ====================

/// IOCFG2: assert on RX FIFO threshold, de-assert below threshold.
pub const IOCFG2_RX_THRESHOLD: u8 = 0x00;
/// IOCFG2: assert while TX FIFO is at or above threshold.
pub const IOCFG2_TX_THRESHOLD: u8 = 0x02;
/// IOCFG0: assert on sync word, de-assert at end of packet.
pub const IOCFG0_SYNC_WORD: u8 = 0x06;
/// FIFOTHR: TX threshold 5 bytes, RX threshold 60 bytes.
pub const FIFOTHR_DEFAULT: u8 = 0x0E;
/// MCSM2: RX timeout disabled.
pub const MCSM2_RX_TIME_NONE: u8 = 0x07;
/// PKTCTRL1: append status, no address check (monitor mode).
pub const PKTCTRL1_MONITOR: u8 = 0x04;
/// PKTCTRL1: append status, address check with broadcast 0x00.
pub const PKTCTRL1_ADDRESS_CHECK: u8 = 0x06;

/// Chip part number reported by PARTNUM.
pub const PART_NUMBER: u8 = 0x00;
/// Chip version reported by VERSION.
pub const CHIP_VERSION: u8 = 0x14;

/// Default register image written at setup, starting at IOCFG2.
///
/// GFSK, 250 kbaud, variable packet length with CRC and data whitening,
/// status bytes appended, address check with broadcast.
pub const DEFAULT_CONFIG: [u8; 41] = [
    0x06, // IOCFG2
    0x2E, // IOCFG1
    0x0E, // IOCFG0
    0x0F, // FIFOTHR
    0x9B, // SYNC1
    0xAD, // SYNC0
    0xFF, // PKTLEN
    0x06, // PKTCTRL1
    0x45, // PKTCTRL0
    0xFF, // ADDR
    0x00, // CHANNR
    0x0B, // FSCTRL1
    0x00, // FSCTRL0
    0x21, // FREQ2
    0x71, // FREQ1
    0x7A, // FREQ0
    0x2D, // MDMCFG4
    0xF8, // MDMCFG3
    0x73, // MDMCFG2
    0x42, // MDMCFG1
    0xF8, // MDMCFG0
    0x00, // DEVIATN
    0x07, // MCSM2
    0x03, // MCSM1
    0x18, // MCSM0
    0x1D, // FOCCFG
    0x1C, // BSCFG
    0xC0, // AGCCTRL2
    0x49, // AGCCTRL1
    0xB2, // AGCCTRL0
    0x87, // WOREVT1
    0x6B, // WOREVT0
    0xFB, // WORCTRL
    0xB6, // FREND1
    0x10, // FREND0
    0xEA, // FSCAL3
    0x2A, // FSCAL2
    0x00, // FSCAL1
    0x1F, // FSCAL0
    0x41, // RCCTRL1
    0x00, // RCCTRL0
];

/// Default PA table (entry 1 is the 0 dBm output power).
pub const DEFAULT_PATABLE: [u8; PATABLE_SIZE] = [0x00, 0xC2, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

// ==================== Reset timing ====================

/// Wait after the power-up chip select pulse (microseconds).
pub const POWER_UP_WAIT_US: u32 = 40;
/// Wait for the crystal to settle after SRES (microseconds).
pub const RESET_WAIT_US: u32 = 100;
/// Maximum busy-wait for MISO to go low after chip select (microseconds).
pub const MISO_READY_TIMEOUT_US: u32 = 1_000;

// ==================== Command strobes ====================

/// Command strobe (write to 0x30-0x3D with no data byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Strobe {
    /// Reset chip.
    Sres = 0x30,
    /// Enable and calibrate frequency synthesizer.
    Sfstxon = 0x31,
    /// Turn off crystal oscillator.
    Sxoff = 0x32,
    /// Calibrate frequency synthesizer and turn it off.
    Scal = 0x33,
    /// Enable RX.
    Srx = 0x34,
    /// Enable TX.
    Stx = 0x35,
    /// Exit RX / TX, go to IDLE.
    Sidle = 0x36,
    /// Automatic frequency offset compensation.
    Safc = 0x37,
    /// Start wake-on-radio polling.
    Swor = 0x38,
    /// Enter power down when CS goes high.
    Spwd = 0x39,
    /// Flush the RX FIFO.
    Sfrx = 0x3A,
    /// Flush the TX FIFO.
    Sftx = 0x3B,
    /// Reset the wake-on-radio timer.
    Sworrst = 0x3C,
    /// No operation, returns the status byte.
    Snop = 0x3D,
}

impl Strobe {
    /// Address of this strobe.
    pub fn address(self) -> u8 {
        self as u8
    }

    /// Decode a strobe address.
    pub fn from_address(address: u8) -> Option<Self> {
        Some(match address {
            0x30 => Self::Sres,
            0x31 => Self::Sfstxon,
            0x32 => Self::Sxoff,
            0x33 => Self::Scal,
            0x34 => Self::Srx,
            0x35 => Self::Stx,
            0x36 => Self::Sidle,
            0x37 => Self::Safc,
            0x38 => Self::Swor,
            0x39 => Self::Spwd,
            0x3A => Self::Sfrx,
            0x3B => Self::Sftx,
            0x3C => Self::Sworrst,
            0x3D => Self::Snop,
            _ => return None,
        })
    }
}

impl fmt::Display for Strobe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sres => "SRES",
            Self::Sfstxon => "SFSTXON",
            Self::Sxoff => "SXOFF",
            Self::Scal => "SCAL",
            Self::Srx => "SRX",
            Self::Stx => "STX",
            Self::Sidle => "SIDLE",
            Self::Safc => "SAFC",
            Self::Swor => "SWOR",
            Self::Spwd => "SPWD",
            Self::Sfrx => "SFRX",
            Self::Sftx => "SFTX",
            Self::Sworrst => "SWORRST",
            Self::Snop => "SNOP",
        };
        f.write_str(name)
    }
}

// ==================== Main radio control state ====================

/// Chip-internal main radio control state (MARCSTATE register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarcState(u8);

impl MarcState {
    pub const SLEEP: Self = Self(0);
    pub const IDLE: Self = Self(1);
    pub const XOFF: Self = Self(2);
    pub const MANCAL: Self = Self(3);
    pub const FS_WAKEUP: Self = Self(6);
    pub const CALIBRATE: Self = Self(8);
    pub const SETTLING: Self = Self(9);
    pub const RX: Self = Self(13);
    pub const TXRX_SETTLING: Self = Self(16);
    pub const RXFIFO_OVERFLOW: Self = Self(17);
    pub const FSTXON: Self = Self(18);
    pub const TX: Self = Self(19);
    pub const RXTX_SETTLING: Self = Self(21);
    pub const TXFIFO_UNDERFLOW: Self = Self(22);

    /// Wrap a raw MARCSTATE value (upper bits are masked off).
    pub fn from_raw(value: u8) -> Self {
        Self(value & MARCSTATE_MASK)
    }

    /// Raw 5-bit state value.
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Human-readable name. Sub-states collapse onto their group.
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "SLEEP",
            1 => "IDLE",
            2 => "XOFF",
            3..=5 => "MANCAL",
            6 | 7 => "FS_WAKEUP",
            8 | 12 => "CALIBRATE",
            9..=11 => "SETTLING",
            13..=15 => "RX",
            16 => "TXRX_SETTLING",
            17 => "RXFIFO_OVERFLOW",
            18 => "FSTXON",
            19 | 20 => "TX",
            21 => "RXTX_SETTLING",
            22 => "TXFIFO_UNDERFLOW",
            _ => "UNKNOWN",
        }
    }

    /// State field (bits 6:4) of the chip status byte for this MARC state.
    pub fn status_bits(self) -> u8 {
        let state = match self.0 {
            1 => 0,
            13..=15 => 1,
            19 | 20 => 2,
            18 => 3,
            8 | 12 => 4,
            3..=11 | 16 | 21 => 5,
            17 => 6,
            22 => 7,
            _ => 0,
        };
        state << 4
    }
}

impl fmt::Display for MarcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frequency band, selects the default base frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Band {
    /// 433 MHz ISM band.
    Mhz433,
    /// 868 MHz SRD band.
    Mhz868,
    /// 915 MHz ISM band.
    Mhz915,
}

impl Band {
    /// FREQ2..FREQ0 register words for the band's base frequency.
    pub fn base_frequency(self) -> [u8; 3] {
        match self {
            Self::Mhz433 => [0x10, 0xA7, 0x62],
            Self::Mhz868 => [0x21, 0x71, 0x7F],
            Self::Mhz915 => [0x23, 0x31, 0x3B],
        }
    }
}

impl Default for Band {
    fn default() -> Self {
        #[cfg(feature = "band-915")]
        return Self::Mhz915;
        #[cfg(all(feature = "band-433", not(feature = "band-915")))]
        return Self::Mhz433;
        #[cfg(not(any(feature = "band-915", feature = "band-433")))]
        Self::Mhz868
    }
}

/// Crystal frequency of the reference design (Hz).
pub const CRYSTAL_HZ: u64 = 26_000_000;

/// Convert a carrier frequency in Hz to FREQ2..FREQ0 register words.
///
/// `f_carrier = f_xosc / 2^16 * FREQ`
pub fn frequency_word(hz: u32) -> [u8; 3] {
    let word = ((hz as u64) << 16) / CRYSTAL_HZ;
    [(word >> 16) as u8, (word >> 8) as u8, word as u8]
}

/// Channel register value for a channel number.
pub fn channel_register(channel: u8) -> u8 {
    channel.saturating_mul(CHANNEL_SPACING)
}
