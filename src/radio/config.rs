//! Board wiring and radio settings.

use super::regs::{Band, MAX_ADDRESS, MAX_CHANNEL, MIN_ADDRESS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Board wiring of one transceiver.
///
/// | Field | Default | Notes |
/// |-------|---------|-------|
/// | spi   | 0       | SPI bus index |
/// | cs    | 53      | chip select GPIO |
/// | gdo0  | 27      | sync word / end of packet |
/// | gdo1  | 55      | shared with MISO (ready signal) |
/// | gdo2  | 28      | FIFO threshold |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cc110xParams {
    pub spi: u8,
    pub cs: u8,
    pub gdo0: u8,
    pub gdo1: u8,
    pub gdo2: u8,
}

impl Default for Cc110xParams {
    fn default() -> Self {
        Self {
            spi: 0,
            cs: 53,
            gdo0: 27,
            gdo1: 55,
            gdo2: 28,
        }
    }
}

/// Settings applied at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    /// Channel number, `0..=MAX_CHANNEL`.
    pub channel: u8,
    /// Node address, `MIN_ADDRESS..=MAX_ADDRESS`.
    pub address: u16,
    /// Band whose default base frequency is programmed.
    pub band: Band,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            address: 1,
            band: Band::default(),
        }
    }
}

/// Invalid radio settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    ChannelOutOfRange(u8),
    AddressOutOfRange(u16),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelOutOfRange(ch) => {
                write!(f, "channel {} out of range (0..={})", ch, MAX_CHANNEL)
            }
            Self::AddressOutOfRange(addr) => write!(
                f,
                "address {} out of range ({}..={})",
                addr, MIN_ADDRESS, MAX_ADDRESS
            ),
        }
    }
}

impl std::error::Error for SettingsError {}

impl RadioSettings {
    /// Check channel and address ranges.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.channel > MAX_CHANNEL {
            return Err(SettingsError::ChannelOutOfRange(self.channel));
        }
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&self.address) {
            return Err(SettingsError::AddressOutOfRange(self.address));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc110x_rs_macros::device_test;

    #[device_test]
    fn default_params_match_reference_board() {
        let p = Cc110xParams::default();
        assert_eq!((p.spi, p.cs, p.gdo0, p.gdo1, p.gdo2), (0, 53, 27, 55, 28));
    }

    #[device_test]
    fn default_settings_are_valid() {
        assert_eq!(RadioSettings::default().validate(), Ok(()));
    }

    #[device_test]
    fn validate_rejects_out_of_range() {
        let bad_channel = RadioSettings {
            channel: MAX_CHANNEL + 1,
            ..Default::default()
        };
        assert_eq!(
            bad_channel.validate(),
            Err(SettingsError::ChannelOutOfRange(25))
        );

        for address in [0u16, 256, 1000] {
            let bad = RadioSettings {
                address,
                ..Default::default()
            };
            assert_eq!(bad.validate(), Err(SettingsError::AddressOutOfRange(address)));
        }
    }

    #[device_test]
    fn settings_deserialize_with_defaults() {
        let settings: RadioSettings = serde_json::from_str(r#"{"channel": 5}"#).unwrap();
        assert_eq!(settings.channel, 5);
        assert_eq!(settings.address, 1);
    }
}
