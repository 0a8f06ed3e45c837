//! GDO interrupt lines.
//!
//! GDO0 signals sync word / end of packet, GDO2 signals FIFO threshold
//! crossings. The driver enables and disables each line through
//! [`IrqControl`]; the interrupt source (a GPIO ISR, or the simulator)
//! reports edges through [`InterruptSink`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// One of the two GDO lines the driver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gdo {
    Gdo0,
    Gdo2,
}

/// Edge that triggers the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Arms and disarms GDO interrupts.
pub trait IrqControl {
    fn enable(&self, line: Gdo, edge: Edge);
    fn disable(&self, line: Gdo);
    fn is_enabled(&self, line: Gdo) -> bool;

    /// Called by the worker for each edge it takes off the mailbox.
    /// Backends whose interrupts disarm on delivery re-arm here.
    fn acknowledge(&self, _line: Gdo) {}
}

/// Receiver of GDO edges. Implementations must be safe to call from
/// interrupt context: no blocking, no allocation, no logging.
pub trait InterruptSink: Send + Sync {
    fn raise(&self, line: Gdo);
}

#[derive(Debug, Default)]
struct Line {
    enabled: AtomicBool,
    edge: AtomicU8,
}

#[derive(Debug, Default)]
struct Lines {
    gdo0: Line,
    gdo2: Line,
}

/// Interrupt enable flags kept in atomics.
///
/// Used by the simulator, and by hardware backends as the software mask in
/// front of the GPIO interrupt.
#[derive(Debug, Clone, Default)]
pub struct SoftIrqLines {
    inner: Arc<Lines>,
}

impl SoftIrqLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, line: Gdo) -> &Line {
        match line {
            Gdo::Gdo0 => &self.inner.gdo0,
            Gdo::Gdo2 => &self.inner.gdo2,
        }
    }

    /// Edge configured for `line` (last value passed to `enable`).
    pub fn edge(&self, line: Gdo) -> Edge {
        match self.line(line).edge.load(Ordering::SeqCst) {
            0 => Edge::Rising,
            1 => Edge::Falling,
            _ => Edge::Both,
        }
    }
}

impl IrqControl for SoftIrqLines {
    fn enable(&self, line: Gdo, edge: Edge) {
        let l = self.line(line);
        let raw = match edge {
            Edge::Rising => 0,
            Edge::Falling => 1,
            Edge::Both => 2,
        };
        l.edge.store(raw, Ordering::SeqCst);
        l.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self, line: Gdo) {
        self.line(line).enabled.store(false, Ordering::SeqCst);
    }

    fn is_enabled(&self, line: Gdo) -> bool {
        self.line(line).enabled.load(Ordering::SeqCst)
    }
}

impl<T: IrqControl + ?Sized> IrqControl for Arc<T> {
    fn enable(&self, line: Gdo, edge: Edge) {
        (**self).enable(line, edge)
    }

    fn disable(&self, line: Gdo) {
        (**self).disable(line)
    }

    fn is_enabled(&self, line: Gdo) -> bool {
        (**self).is_enabled(line)
    }

    fn acknowledge(&self, line: Gdo) {
        (**self).acknowledge(line)
    }
}
