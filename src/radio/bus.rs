//! Shared SPI bus with per-transaction chip-select framing.
//!
//! A [`SpiTransport`] moves single bytes while the chip is selected. The
//! [`SharedBus`] wraps one behind a mutex so the driver façade and the
//! event worker can both issue register accesses. Every access runs as a
//! single transaction: lock, select, header, data, deselect, unlock.

use super::header::{AccessMode, SpiHeader};
use super::regs::{Strobe, FIFO};
use log::trace;
use std::sync::{Arc, Mutex, MutexGuard};

/// Byte-level access to a CC110x over SPI.
pub trait SpiTransport {
    type Error: std::error::Error + 'static;

    /// Assert chip select and wait for the chip to signal ready.
    fn select(&mut self) -> Result<(), Self::Error>;

    /// Exchange one byte.
    fn transfer(&mut self, out: u8) -> Result<u8, Self::Error>;

    /// Release chip select.
    fn deselect(&mut self) -> Result<(), Self::Error>;

    /// Busy-wait (used during the reset sequence).
    fn delay_us(&mut self, us: u32);
}

/// An open transaction (chip selected).
pub struct Transaction<'a, T: SpiTransport> {
    transport: &'a mut T,
}

impl<T: SpiTransport> Transaction<'_, T> {
    /// Send a header byte, returning the chip status byte.
    pub fn header(&mut self, header: SpiHeader) -> Result<u8, T::Error> {
        self.transport.transfer(header.encode())
    }

    pub fn transfer(&mut self, out: u8) -> Result<u8, T::Error> {
        self.transport.transfer(out)
    }
}

/// Cloneable handle to a transport guarded by a mutex.
pub struct SharedBus<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedBus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Lock the transport, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the transport, outside any
    /// transaction.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<T: SpiTransport> SharedBus<T> {
    /// Run one chip-select framed transaction.
    ///
    /// The chip is deselected even if `f` fails.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_, T>) -> Result<R, T::Error>,
    ) -> Result<R, T::Error> {
        let mut guard = self.lock();
        guard.select()?;
        let result = f(&mut Transaction {
            transport: &mut *guard,
        });
        let released = guard.deselect();
        let value = result?;
        released?;
        Ok(value)
    }

    /// Issue a command strobe, returning the chip status byte.
    pub fn strobe(&self, strobe: Strobe) -> Result<u8, T::Error> {
        trace!("spi: strobe {}", strobe);
        self.transaction(|tx| tx.header(SpiHeader::new(strobe.address(), AccessMode::WriteSingle)))
    }

    /// Write one configuration register.
    pub fn write_reg(&self, addr: u8, value: u8) -> Result<(), T::Error> {
        trace!("spi: write {:#04x} = {:#04x}", addr, value);
        self.transaction(|tx| {
            tx.header(SpiHeader::new(addr, AccessMode::WriteSingle))?;
            tx.transfer(value)?;
            Ok(())
        })
    }

    /// Read one configuration register.
    pub fn read_reg(&self, addr: u8) -> Result<u8, T::Error> {
        let value = self.transaction(|tx| {
            tx.header(SpiHeader::new(addr, AccessMode::ReadSingle))?;
            tx.transfer(0)
        })?;
        trace!("spi: read {:#04x} -> {:#04x}", addr, value);
        Ok(value)
    }

    /// Read a status register (burst bit set, one data byte).
    pub fn read_status(&self, addr: u8) -> Result<u8, T::Error> {
        let value = self.transaction(|tx| {
            tx.header(SpiHeader::new(addr, AccessMode::ReadBurst))?;
            tx.transfer(0)
        })?;
        trace!("spi: status {:#04x} -> {:#04x}", addr, value);
        Ok(value)
    }

    /// Write consecutive registers (or the TX FIFO / PATABLE) in one burst.
    pub fn write_burst(&self, addr: u8, data: &[u8]) -> Result<(), T::Error> {
        trace!("spi: burst write {:#04x} <- {} bytes", addr, data.len());
        self.transaction(|tx| {
            tx.header(SpiHeader::new(addr, AccessMode::WriteBurst))?;
            for &b in data {
                tx.transfer(b)?;
            }
            Ok(())
        })
    }

    /// Read consecutive registers (or the RX FIFO / PATABLE) in one burst.
    pub fn read_burst(&self, addr: u8, out: &mut [u8]) -> Result<(), T::Error> {
        self.transaction(|tx| {
            tx.header(SpiHeader::new(addr, AccessMode::ReadBurst))?;
            for slot in out.iter_mut() {
                *slot = tx.transfer(0)?;
            }
            Ok(())
        })?;
        trace!("spi: burst read {:#04x} -> {} bytes", addr, out.len());
        Ok(())
    }

    /// Read `n` bytes from the RX FIFO.
    pub fn read_fifo(&self, n: usize) -> Result<Vec<u8>, T::Error> {
        let mut out = vec![0; n];
        if n == 1 {
            out[0] = self.read_reg(FIFO)?;
        } else if n > 1 {
            self.read_burst(FIFO, &mut out)?;
        }
        Ok(out)
    }

    /// Toggle chip select for the power-up reset sequence.
    pub fn pulse_select(&self) -> Result<(), T::Error> {
        let mut guard = self.lock();
        guard.deselect()?;
        guard.select()?;
        guard.deselect()
    }

    pub fn delay_us(&self, us: u32) {
        self.lock().delay_us(us);
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording transport for unit tests.

    use super::SpiTransport;
    use std::collections::VecDeque;
    use std::convert::Infallible;

    /// Records every byte and replays scripted responses (0 when empty).
    #[derive(Default)]
    pub struct RecordingTransport {
        pub selected: bool,
        pub transactions: Vec<Vec<u8>>,
        pub responses: VecDeque<u8>,
        pub selects: usize,
    }

    impl SpiTransport for RecordingTransport {
        type Error = Infallible;

        fn select(&mut self) -> Result<(), Infallible> {
            self.selected = true;
            self.selects += 1;
            self.transactions.push(Vec::new());
            Ok(())
        }

        fn transfer(&mut self, out: u8) -> Result<u8, Infallible> {
            assert!(self.selected, "transfer outside a transaction");
            if let Some(current) = self.transactions.last_mut() {
                current.push(out);
            }
            Ok(self.responses.pop_front().unwrap_or(0))
        }

        fn deselect(&mut self) -> Result<(), Infallible> {
            self.selected = false;
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }
}
