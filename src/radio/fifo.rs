//! Fixed-capacity byte FIFO modelling the chip's RX and TX buffers.

use super::regs::FIFO_SIZE;
use std::fmt;

/// FIFO misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    /// Push into a full FIFO (or a slice that does not fit).
    Overflow { requested: usize, free: usize },
    /// Pop from an empty FIFO (or more bytes than are stored).
    Underflow { requested: usize, available: usize },
}

impl fmt::Display for FifoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { requested, free } => {
                write!(f, "FIFO overflow: {} bytes requested, {} free", requested, free)
            }
            Self::Underflow {
                requested,
                available,
            } => write!(
                f,
                "FIFO underflow: {} bytes requested, {} available",
                requested, available
            ),
        }
    }
}

impl std::error::Error for FifoError {}

/// Ring buffer of `N` bytes.
///
/// `0 <= len() <= N` always holds. Rejected operations leave the contents
/// untouched.
#[derive(Clone)]
pub struct Fifo<const N: usize> {
    buf: [u8; N],
    head: usize,
    len: usize,
}

/// FIFO with the chip's 64-byte geometry.
pub type HwFifo = Fifo<FIFO_SIZE>;

impl<const N: usize> Fifo<N> {
    /// Create an empty FIFO.
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Free space in bytes.
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), FifoError> {
        if self.is_full() {
            return Err(FifoError::Overflow {
                requested: 1,
                free: 0,
            });
        }
        let tail = (self.head + self.len) % N;
        self.buf[tail] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append all of `bytes`, or nothing if they do not fit.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        if bytes.len() > self.free() {
            return Err(FifoError::Overflow {
                requested: bytes.len(),
                free: self.free(),
            });
        }
        for &b in bytes {
            let tail = (self.head + self.len) % N;
            self.buf[tail] = b;
            self.len += 1;
        }
        Ok(())
    }

    /// Remove the oldest byte.
    pub fn pop(&mut self) -> Result<u8, FifoError> {
        if self.is_empty() {
            return Err(FifoError::Underflow {
                requested: 1,
                available: 0,
            });
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Ok(byte)
    }

    /// Fill `out` with the oldest bytes, or take nothing if too few are stored.
    pub fn pop_into(&mut self, out: &mut [u8]) -> Result<(), FifoError> {
        if out.len() > self.len {
            return Err(FifoError::Underflow {
                requested: out.len(),
                available: self.len,
            });
        }
        for slot in out.iter_mut() {
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % N;
            self.len -= 1;
        }
        Ok(())
    }

    /// Oldest byte without removing it.
    pub fn peek(&self) -> Option<u8> {
        (!self.is_empty()).then(|| self.buf[self.head])
    }

    /// Remove and return everything.
    pub fn drain_all(&mut self) -> Vec<u8> {
        let mut out = vec![0; self.len];
        // Cannot fail: out.len() == self.len
        let _ = self.pop_into(&mut out);
        self.flush();
        out
    }

    /// Discard the contents and reset both cursors.
    pub fn flush(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<const N: usize> Default for Fifo<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for Fifo<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fifo")
            .field("capacity", &N)
            .field("len", &self.len)
            .finish()
    }
}


#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use cc110x_rs_macros::tap_test;

    #[tap_test]
    fn hardware_fifo_wraps_around() {
        let mut fifo = HwFifo::new();
        for round in 0..3u8 {
            fifo.push_slice(&[round; 40]).unwrap();
            let mut out = [0u8; 40];
            fifo.pop_into(&mut out).unwrap();
            assert_eq!(out, [round; 40]);
        }
        assert!(fifo.is_empty());
    }

    #[tap_test]
    fn overfull_slice_is_rejected_whole() -> crate::testing::TestResult {
        let mut fifo = HwFifo::new();
        fifo.push_slice(&[0; 60])?;
        assert!(fifo.push_slice(&[0; 5]).is_err());
        assert_eq!(fifo.len(), 60);
        Ok(())
    }
}
