//! ESP32 wiring for one CC110x.
//!
//! | Signal | Source |
//! |--------|--------|
//! | SCLK / MOSI | [`SpiPins`] |
//! | MISO | `Cc110xParams::gdo1` (read back as the ready signal) |
//! | CS | `Cc110xParams::cs`, driven manually |
//! | GDO0 / GDO2 | `Cc110xParams::gdo0` / `gdo2`, GPIO interrupts |
//!
//! GPIO interrupts do no work in ISR context beyond a task notification.
//! A bridge thread turns the notification bits into mailbox posts.

use crate::radio::{Cc110xParams, Edge, Gdo, HalTransport, IrqControl, MailboxHandle, SoftIrqLines};
use esp_idf_hal::delay::{Ets, BLOCK};
use esp_idf_hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, InterruptType, Output, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::spi::config::{Config as SpiConfig, DriverConfig};
use esp_idf_hal::spi::{SpiAnyPins, SpiBusDriver, SpiDriver};
use esp_idf_hal::task::notification::Notification;
use esp_idf_hal::units::FromValueType;
use esp_idf_sys::EspError;
use log::{info, warn};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const GDO0_BIT: u32 = 1 << 0;
const GDO2_BIT: u32 = 1 << 1;
const SPI_BAUDRATE_MHZ: u32 = 5;

/// SPI clock and data-out pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SpiPins {
    pub sclk: i32,
    pub mosi: i32,
}

impl Default for SpiPins {
    fn default() -> Self {
        Self { sclk: 18, mosi: 23 }
    }
}

/// Board bring-up failure.
#[derive(Debug)]
pub enum BoardError {
    Esp(EspError),
    Transport(String),
    Thread(std::io::Error),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esp(e) => write!(f, "ESP-IDF error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Thread(e) => write!(f, "cannot start IRQ bridge: {}", e),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<EspError> for BoardError {
    fn from(e: EspError) -> Self {
        Self::Esp(e)
    }
}

/// Output pin type used for chip select.
type CsPin<'d> = PinDriver<'d, AnyOutputPin, Output>;
type PinError<'d> = <CsPin<'d> as embedded_hal::digital::ErrorType>::Error;

/// MISO level, read through the GPIO matrix while the SPI peripheral owns
/// the pin.
pub struct MisoLevel {
    gpio: i32,
}

impl embedded_hal::digital::ErrorType for MisoLevel {
    type Error = PinError<'static>;
}

impl embedded_hal::digital::InputPin for MisoLevel {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        // SAFETY: reading the input level of a configured GPIO.
        Ok(unsafe { esp_idf_sys::gpio_get_level(self.gpio) } != 0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_high()?)
    }
}

pub type Esp32Transport<'d> = HalTransport<SpiBusDriver<'d, SpiDriver<'d>>, CsPin<'d>, MisoLevel, Ets>;

/// Build the SPI transport for the transceiver described by `params`.
pub fn open_transport<'d, SPI: SpiAnyPins>(
    spi: impl Peripheral<P = SPI> + 'd,
    pins: &SpiPins,
    params: &Cc110xParams,
) -> Result<Esp32Transport<'d>, BoardError> {
    // SAFETY: the pin numbers come from the board configuration and are not
    // claimed by any other driver.
    let (sclk, mosi, miso, cs) = unsafe {
        (
            AnyOutputPin::new(pins.sclk),
            AnyOutputPin::new(pins.mosi),
            AnyInputPin::new(params.gdo1 as i32),
            AnyOutputPin::new(params.cs as i32),
        )
    };
    let driver = SpiDriver::new(spi, sclk, mosi, Some(miso), &DriverConfig::new())?;
    let bus = SpiBusDriver::new(driver, &SpiConfig::new().baudrate(SPI_BAUDRATE_MHZ.MHz().into()))?;
    let cs = PinDriver::output(cs)?;
    let miso = MisoLevel {
        gpio: params.gdo1 as i32,
    };
    HalTransport::new(bus, cs, miso, Ets).map_err(|e| BoardError::Transport(e.to_string()))
}

/// GDO0 / GDO2 interrupt pins.
pub struct Esp32Gdo {
    gdo0: Mutex<PinDriver<'static, AnyIOPin, Input>>,
    gdo2: Mutex<PinDriver<'static, AnyIOPin, Input>>,
    mask: SoftIrqLines,
}

impl Esp32Gdo {
    pub fn new(params: &Cc110xParams) -> Result<Arc<Self>, BoardError> {
        // SAFETY: see `open_transport`.
        let (gdo0, gdo2) = unsafe { (AnyIOPin::new(params.gdo0 as i32), AnyIOPin::new(params.gdo2 as i32)) };
        Ok(Arc::new(Self {
            gdo0: Mutex::new(PinDriver::input(gdo0)?),
            gdo2: Mutex::new(PinDriver::input(gdo2)?),
            mask: SoftIrqLines::new(),
        }))
    }

    fn pin(&self, line: Gdo) -> std::sync::MutexGuard<'_, PinDriver<'static, AnyIOPin, Input>> {
        let pin = match line {
            Gdo::Gdo0 => &self.gdo0,
            Gdo::Gdo2 => &self.gdo2,
        };
        pin.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm(&self, line: Gdo) {
        if let Err(e) = self.pin(line).enable_interrupt() {
            warn!("cc110x: cannot arm {:?}: {}", line, e);
        }
    }

    /// Route both GDO interrupts to `handle` through a bridge thread.
    pub fn start_bridge(self: &Arc<Self>, handle: MailboxHandle) -> Result<JoinHandle<()>, BoardError> {
        let gdo = Arc::clone(self);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("cc110x_irq".into())
            .spawn(move || {
                let notification = Notification::new();
                let subscribed = [(Gdo::Gdo0, GDO0_BIT), (Gdo::Gdo2, GDO2_BIT)]
                    .into_iter()
                    .try_for_each(|(line, bit)| {
                        let notifier = notification.notifier();
                        let bit = NonZeroU32::new(bit).unwrap_or(NonZeroU32::MIN);
                        // SAFETY: the callback only sets a notification bit,
                        // which is ISR-safe.
                        unsafe {
                            gdo.pin(line).subscribe(move || {
                                notifier.notify_and_yield(bit);
                            })
                        }
                    });
                let _ = ready_tx.send(subscribed);
                info!("cc110x: IRQ bridge running");
                loop {
                    let Some(bits) = notification.wait(BLOCK) else {
                        continue;
                    };
                    if bits.get() & GDO0_BIT != 0 {
                        handle.on_gdo0();
                    }
                    if bits.get() & GDO2_BIT != 0 {
                        handle.on_gdo2();
                    }
                }
            })
            .map_err(BoardError::Thread)?;
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(e)) => Err(BoardError::Esp(e)),
            Err(_) => Err(BoardError::Transport("IRQ bridge exited during setup".into())),
        }
    }
}

impl IrqControl for Esp32Gdo {
    fn enable(&self, line: Gdo, edge: Edge) {
        let kind = match edge {
            Edge::Rising => InterruptType::PosEdge,
            Edge::Falling => InterruptType::NegEdge,
            Edge::Both => InterruptType::AnyEdge,
        };
        self.mask.enable(line, edge);
        if let Err(e) = self.pin(line).set_interrupt_type(kind) {
            warn!("cc110x: cannot set {:?} edge: {}", line, e);
        }
        self.arm(line);
    }

    fn disable(&self, line: Gdo) {
        self.mask.disable(line);
        if let Err(e) = self.pin(line).disable_interrupt() {
            warn!("cc110x: cannot disarm {:?}: {}", line, e);
        }
    }

    fn is_enabled(&self, line: Gdo) -> bool {
        self.mask.is_enabled(line)
    }

    fn acknowledge(&self, line: Gdo) {
        if self.mask.is_enabled(line) {
            self.arm(line);
        }
    }
}
