//! SPI transport over `embedded-hal` 1.0 traits.
//!
//! Chip select is driven manually because the CC110x needs MISO to go low
//! (crystal running) after CS is asserted and before the header byte.

use super::bus::SpiTransport;
use super::regs::MISO_READY_TIMEOUT_US;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use std::fmt;

/// Hardware transport failure.
#[derive(Debug)]
pub enum HalError<S, P> {
    Spi(S),
    Pin(P),
    /// MISO stayed high after chip select.
    MisoTimeout,
}

impl<S: fmt::Debug, P: fmt::Debug> fmt::Display for HalError<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {:?}", e),
            Self::Pin(e) => write!(f, "GPIO error: {:?}", e),
            Self::MisoTimeout => write!(
                f,
                "chip not ready: MISO high after {} us",
                MISO_READY_TIMEOUT_US
            ),
        }
    }
}

impl<S: fmt::Debug, P: fmt::Debug> std::error::Error for HalError<S, P> {}

/// CC110x transport built from an SPI bus, a CS output and the MISO level.
pub struct HalTransport<SPI, CS, MISO, D> {
    spi: SPI,
    cs: CS,
    miso: MISO,
    delay: D,
}

impl<SPI, CS, MISO, D> HalTransport<SPI, CS, MISO, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    MISO: InputPin<Error = CS::Error>,
    D: DelayNs,
{
    /// Take ownership of the bus and pins. CS is driven high.
    pub fn new(spi: SPI, mut cs: CS, miso: MISO, delay: D) -> Result<Self, HalError<SPI::Error, CS::Error>> {
        cs.set_high().map_err(HalError::Pin)?;
        Ok(Self {
            spi,
            cs,
            miso,
            delay,
        })
    }

    /// Give back the bus and pins.
    pub fn release(self) -> (SPI, CS, MISO, D) {
        (self.spi, self.cs, self.miso, self.delay)
    }
}

impl<SPI, CS, MISO, D> SpiTransport for HalTransport<SPI, CS, MISO, D>
where
    SPI: SpiBus<u8>,
    SPI::Error: 'static,
    CS: OutputPin,
    CS::Error: 'static,
    MISO: InputPin<Error = CS::Error>,
    D: DelayNs,
{
    type Error = HalError<SPI::Error, CS::Error>;

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(HalError::Pin)?;
        for _ in 0..MISO_READY_TIMEOUT_US {
            if self.miso.is_low().map_err(HalError::Pin)? {
                return Ok(());
            }
            self.delay.delay_us(1);
        }
        self.cs.set_high().map_err(HalError::Pin)?;
        Err(HalError::MisoTimeout)
    }

    fn transfer(&mut self, out: u8) -> Result<u8, Self::Error> {
        let mut buf = [out];
        self.spi.transfer_in_place(&mut buf).map_err(HalError::Spi)?;
        Ok(buf[0])
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.spi.flush().map_err(HalError::Spi)?;
        self.cs.set_high().map_err(HalError::Pin)
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}
