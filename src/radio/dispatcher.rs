//! Interrupt dispatch and the radio event worker.
//!
//! GDO interrupt handlers do no SPI work. They count the edge and post a
//! message to a bounded mailbox. A single worker owns all follow-up work:
//! draining the RX FIFO, refilling the TX FIFO, CRC checking and
//! re-arming the receiver.
//!
//! ```text
//!   GDO0 / GDO2 ISR ──try_send──▶ mailbox (32) ──▶ Worker ──▶ RadioEvent
//!   application ─────post──────▶               │
//!                                              └── Cc110x (SPI)
//! ```
//!
//! # Receive
//!
//! | Event | Assembly | Action |
//! |-------|----------|--------|
//! | GDO0  | none     | sync word: read length byte, start assembly (empty FIFO: wait, re-check, resync) |
//! | GDO2  | active   | drain up to `FIFO_CHUNK` bytes |
//! | GDO0  | active   | end of packet: read the rest, check CRC, deliver |
//! | GDO2  | none     | FIFO holds data: report `RxAvailable` |
//!
//! # Transmit
//!
//! The first `FIFO_CHUNK` bytes are loaded before STX, each GDO2 (TX FIFO
//! below threshold) loads the next chunk, GDO0 ends the transmission.

use super::bus::SpiTransport;
use super::device::{Cc110x, RadioResult};
use super::irq::{Edge, Gdo, InterruptSink, IrqControl};
use super::packet::{AppendedStatus, Packet, ReceivedPacket, HEADER_LENGTH};
use super::regs::{
    Strobe, FIFO, FIFOTHR, FIFOTHR_DEFAULT, FIFO_CHUNK, FIFO_SIZE, IOCFG0, IOCFG0_SYNC_WORD,
    IOCFG2, IOCFG2_TX_THRESHOLD, MAX_FRAME_LENGTH, STATUS_BYTES,
};
use super::state::{RadioState, Transition};
use log::{debug, info, trace, warn};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Mailbox capacity.
pub const MAILBOX_DEPTH: usize = 32;

/// Worker thread name.
pub const WORKER_THREAD_NAME: &str = "cc110x_event";

/// Wait before re-checking an empty RX FIFO after a sync edge.
const SYNC_SETTLE_US: u32 = 64;

/// Message delivered to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioMessage {
    /// Program the FIFO threshold and start receiving.
    InitMode,
    /// Transmit a frame (length byte first).
    TxMode(Vec<u8>),
    /// Restart the receiver.
    RxMode,
    /// Abandon any packet in progress, flush and restart the receiver.
    RxInvalidMode,
    /// GDO0 edge.
    Gdo0,
    /// GDO2 edge.
    Gdo2,
    /// Stop the worker loop.
    Shutdown,
}

/// Output of the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The RX FIFO holds this many bytes that no assembly claimed.
    RxAvailable(usize),
    /// A packet passed the CRC check.
    PacketReceived(ReceivedPacket),
    /// Transmission finished.
    TxComplete,
    /// Transmission rejected or aborted.
    TxFailed,
}

/// Mailbox post failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    Full,
    Closed,
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "radio mailbox full"),
            Self::Closed => write!(f, "radio worker stopped"),
        }
    }
}

impl std::error::Error for MailboxError {}

#[derive(Debug, Default)]
struct IsrCounters {
    gdo0: AtomicU32,
    gdo2: AtomicU32,
    dropped: AtomicU32,
}

/// Interrupt edge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsrStats {
    pub gdo0: u32,
    pub gdo2: u32,
    /// Edges lost because the mailbox was full.
    pub dropped: u32,
}

/// Sending side of the mailbox. Cheap to clone; safe to use from an ISR.
#[derive(Debug, Clone)]
pub struct MailboxHandle {
    tx: mpsc::Sender<RadioMessage>,
    counters: Arc<IsrCounters>,
}

/// Receiving side of the mailbox, owned by the [`Worker`].
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<RadioMessage>,
}

/// Create a mailbox of `MAILBOX_DEPTH` entries.
pub fn mailbox() -> (MailboxHandle, Mailbox) {
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    (
        MailboxHandle {
            tx,
            counters: Arc::new(IsrCounters::default()),
        },
        Mailbox { rx },
    )
}

impl MailboxHandle {
    /// GDO0 interrupt handler body.
    pub fn on_gdo0(&self) {
        self.counters.gdo0.fetch_add(1, Ordering::SeqCst);
        self.post_from_isr(RadioMessage::Gdo0);
    }

    /// GDO2 interrupt handler body.
    pub fn on_gdo2(&self) {
        self.counters.gdo2.fetch_add(1, Ordering::SeqCst);
        self.post_from_isr(RadioMessage::Gdo2);
    }

    fn post_from_isr(&self, msg: RadioMessage) {
        if self.tx.try_send(msg).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Post a message without blocking.
    pub fn post(&self, msg: RadioMessage) -> Result<(), MailboxError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full,
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }

    /// Queue a frame for transmission.
    pub fn transmit(&self, frame: Vec<u8>) -> Result<(), MailboxError> {
        self.post(RadioMessage::TxMode(frame))
    }

    /// Queue a packet for transmission.
    pub fn send_packet(&self, packet: &Packet) -> Result<(), MailboxError> {
        self.transmit(packet.to_bytes())
    }

    pub fn isr_stats(&self) -> IsrStats {
        IsrStats {
            gdo0: self.counters.gdo0.load(Ordering::SeqCst),
            gdo2: self.counters.gdo2.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }
}

impl InterruptSink for MailboxHandle {
    fn raise(&self, line: Gdo) {
        match line {
            Gdo::Gdo0 => self.on_gdo0(),
            Gdo::Gdo2 => self.on_gdo2(),
        }
    }
}

/// Worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub packets_received: u32,
    pub packets_sent: u32,
    pub crc_errors: u32,
    pub invalid_packets: u32,
    pub resyncs: u32,
    pub faults: u32,
    pub spurious_interrupts: u32,
    pub tx_bursts: u32,
    pub rx_notifications: u32,
}

#[derive(Debug)]
struct RxAssembly {
    frame: Vec<u8>,
    bytes_left: usize,
}

#[derive(Debug)]
struct TxJob {
    frame: Vec<u8>,
    sent: usize,
    resume_rx: bool,
}

impl TxJob {
    fn remaining(&self) -> usize {
        self.frame.len() - self.sent
    }
}

/// Serialises all radio follow-up work for one device.
pub struct Worker {
    mailbox: Mailbox,
    events: mpsc::UnboundedSender<RadioEvent>,
    rx: Option<RxAssembly>,
    tx: Option<TxJob>,
    /// A packet finished through GDO2 draining; its end-of-packet edge on
    /// GDO0 is still to come.
    eop_pending: bool,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker and the receiver for its events.
    pub fn new(mailbox: Mailbox) -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                mailbox,
                events,
                rx: None,
                tx: None,
                eop_pending: false,
                stats: WorkerStats::default(),
            },
            events_rx,
        )
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// True while a frame is being transmitted.
    pub fn is_transmitting(&self) -> bool {
        self.tx.is_some()
    }

    /// True while a received packet is being assembled.
    pub fn is_receiving_packet(&self) -> bool {
        self.rx.is_some()
    }

    /// Handle every queued message without blocking. Returns the number
    /// handled.
    pub fn process_pending<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.mailbox.rx.try_recv() {
            handled += 1;
            if self.handle(dev, msg).is_break() {
                break;
            }
        }
        handled
    }

    /// Block on the mailbox until `Shutdown` or every sender is gone.
    ///
    /// Must not be called from within an async runtime.
    pub fn run<T: SpiTransport, I: IrqControl>(
        mut self,
        device: Arc<Mutex<Cc110x<T, I>>>,
    ) -> WorkerStats {
        info!("cc110x: event worker started");
        while let Some(msg) = self.mailbox.rx.blocking_recv() {
            let mut dev = device.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.handle(&mut *dev, msg).is_break() {
                break;
            }
        }
        info!("cc110x: event worker stopped ({:?})", self.stats);
        self.stats
    }

    /// Run the worker on a dedicated thread.
    pub fn spawn<T, I>(self, device: Arc<Mutex<Cc110x<T, I>>>) -> std::io::Result<JoinHandle<WorkerStats>>
    where
        T: SpiTransport + Send + 'static,
        I: IrqControl + Send + 'static,
    {
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || self.run(device))
    }

    /// Handle one message. Faults are logged, counted and followed by a
    /// receiver resync.
    pub fn handle<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
        msg: RadioMessage,
    ) -> ControlFlow<()> {
        trace!("cc110x worker: {:?} in state {}", msg, dev.state());
        if msg == RadioMessage::Shutdown {
            return ControlFlow::Break(());
        }
        if let Err(e) = self.dispatch(dev, msg) {
            self.stats.faults += 1;
            warn!("cc110x worker: {}", e);
            self.recover(dev);
        }
        ControlFlow::Continue(())
    }

    fn dispatch<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
        msg: RadioMessage,
    ) -> RadioResult<(), T> {
        match msg {
            RadioMessage::InitMode => {
                dev.bus().write_reg(FIFOTHR, FIFOTHR_DEFAULT)?;
                self.rx = None;
                self.eop_pending = false;
                dev.switch_to_rx()
            }
            RadioMessage::RxMode => {
                if self.tx.is_some() {
                    debug!("cc110x worker: RX request ignored during TX");
                    return Ok(());
                }
                self.rx = None;
                self.eop_pending = false;
                dev.switch_to_rx()
            }
            RadioMessage::RxInvalidMode => self.resync(dev),
            RadioMessage::TxMode(frame) => self.start_tx(dev, frame),
            RadioMessage::Gdo0 => {
                dev.irq().acknowledge(Gdo::Gdo0);
                if self.tx.is_some() {
                    self.finish_tx(dev)
                } else if self.rx.is_some() {
                    self.end_of_packet(dev)
                } else if dev.state() == RadioState::Rx {
                    self.sync_word(dev)
                } else {
                    self.spurious(Gdo::Gdo0, dev.state());
                    Ok(())
                }
            }
            RadioMessage::Gdo2 => {
                dev.irq().acknowledge(Gdo::Gdo2);
                if self.tx.is_some() {
                    self.refill_tx(dev)
                } else if self.rx.is_some() {
                    self.drain_rx(dev)
                } else if dev.state() == RadioState::Rx {
                    self.notify_available(dev)
                } else {
                    self.spurious(Gdo::Gdo2, dev.state());
                    Ok(())
                }
            }
            RadioMessage::Shutdown => Ok(()),
        }
    }

    fn spurious(&mut self, line: Gdo, state: RadioState) {
        self.stats.spurious_interrupts += 1;
        debug!("cc110x worker: ignoring {:?} in state {}", line, state);
    }

    fn emit(&self, event: RadioEvent) {
        if self.events.send(event).is_err() {
            trace!("cc110x worker: no event listener");
        }
    }

    // ==================== Transmit ====================

    fn start_tx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
        frame: Vec<u8>,
    ) -> RadioResult<(), T> {
        let well_formed = frame
            .first()
            .is_some_and(|&len| len as usize + 1 == frame.len())
            && frame.len() <= MAX_FRAME_LENGTH;
        if !well_formed {
            warn!("cc110x worker: rejecting malformed TX frame ({} bytes)", frame.len());
            self.stats.invalid_packets += 1;
            self.emit(RadioEvent::TxFailed);
            return Ok(());
        }
        if self.tx.is_some() {
            warn!("cc110x worker: TX busy, dropping frame");
            self.emit(RadioEvent::TxFailed);
            return Ok(());
        }

        let resume_rx = dev.state().is_receiving();
        if self.rx.take().is_some() {
            debug!("cc110x worker: abandoning RX assembly for TX");
        }
        dev.apply(Transition::TxStart)?;

        let irq = dev.irq();
        irq.disable(Gdo::Gdo2);
        irq.disable(Gdo::Gdo0);
        let bus = dev.bus();
        bus.strobe(Strobe::Sidle)?;
        bus.strobe(Strobe::Sftx)?;
        bus.write_reg(IOCFG2, IOCFG2_TX_THRESHOLD)?;
        bus.write_reg(IOCFG0, IOCFG0_SYNC_WORD)?;

        let first = if frame.len() <= FIFO_SIZE {
            frame.len()
        } else {
            FIFO_CHUNK
        };
        irq.enable(Gdo::Gdo0, Edge::Falling);
        if first < frame.len() {
            irq.enable(Gdo::Gdo2, Edge::Falling);
        }
        bus.write_burst(FIFO, &frame[..first])?;
        self.stats.tx_bursts += 1;
        debug!(
            "cc110x worker: TX start, {} bytes ({} in first burst)",
            frame.len(),
            first
        );
        self.tx = Some(TxJob {
            frame,
            sent: first,
            resume_rx,
        });
        bus.strobe(Strobe::Stx)?;
        Ok(())
    }

    fn refill_tx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let Some(job) = self.tx.as_mut() else {
            return Ok(());
        };
        if job.remaining() == 0 {
            self.stats.spurious_interrupts += 1;
            return Ok(());
        }
        let n = job.remaining().min(FIFO_CHUNK);
        let start = job.sent;
        job.sent += n;
        let done = job.remaining() == 0;
        dev.bus().write_burst(FIFO, &job.frame[start..start + n])?;
        self.stats.tx_bursts += 1;
        if done {
            dev.irq().disable(Gdo::Gdo2);
        }
        trace!("cc110x worker: TX refill {} bytes", n);
        Ok(())
    }

    fn finish_tx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let Some(job) = self.tx.take() else {
            return Ok(());
        };
        let complete = job.remaining() == 0;
        if complete {
            self.stats.packets_sent += 1;
            debug!("cc110x worker: TX complete ({} bytes)", job.frame.len());
        } else {
            warn!(
                "cc110x worker: TX ended with {} bytes unsent",
                job.remaining()
            );
            self.stats.faults += 1;
        }

        dev.irq().disable(Gdo::Gdo2);
        dev.irq().disable(Gdo::Gdo0);
        dev.apply(Transition::TxDone {
            resume_rx: job.resume_rx,
        })?;
        if job.resume_rx {
            dev.switch_to_rx()?;
        } else {
            dev.bus().strobe(Strobe::Sidle)?;
        }

        self.emit(if complete {
            RadioEvent::TxComplete
        } else {
            RadioEvent::TxFailed
        });
        Ok(())
    }

    // ==================== Receive ====================

    fn sync_word<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let (mut available, mut overflow) = dev.rx_fifo_status()?;
        if available == 0 && !overflow {
            if std::mem::take(&mut self.eop_pending) {
                trace!("cc110x worker: end of drained packet");
                return Ok(());
            }
            // The length byte may trail the sync edge.
            dev.bus().delay_us(SYNC_SETTLE_US);
            (available, overflow) = dev.rx_fifo_status()?;
            if available == 0 && !overflow {
                debug!("cc110x worker: sync word without data");
                self.stats.invalid_packets += 1;
                return self.resync(dev);
            }
        }
        if overflow {
            return self.resync(dev);
        }
        self.eop_pending = false;

        let length = dev.bus().read_reg(FIFO)?;
        if (length as usize) < HEADER_LENGTH {
            debug!("cc110x worker: invalid length byte {}", length);
            self.stats.invalid_packets += 1;
            return self.resync(dev);
        }

        dev.apply(Transition::RxStart)?;
        let trailer = if dev.status_appended() { STATUS_BYTES } else { 0 };
        let bytes_left = length as usize + trailer;
        let mut frame = Vec::with_capacity(1 + bytes_left);
        frame.push(length);
        self.rx = Some(RxAssembly { frame, bytes_left });

        // The rest fits in the FIFO: wait for end of packet only.
        if bytes_left < FIFO_SIZE {
            dev.irq().disable(Gdo::Gdo2);
        }
        trace!("cc110x worker: sync, expecting {} more bytes", bytes_left);
        Ok(())
    }

    fn drain_rx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let (available, overflow) = dev.rx_fifo_status()?;
        if overflow {
            return self.resync(dev);
        }
        let Some(asm) = self.rx.as_mut() else {
            return Ok(());
        };
        // Never read the last byte of an incomplete packet (RX FIFO errata).
        let n = if available >= asm.bytes_left {
            asm.bytes_left
        } else {
            available.saturating_sub(1).min(FIFO_CHUNK)
        };
        if n == 0 {
            return Ok(());
        }
        let chunk = dev.bus().read_fifo(n)?;
        asm.frame.extend_from_slice(&chunk);
        asm.bytes_left -= n;
        trace!("cc110x worker: drained {} bytes, {} left", n, asm.bytes_left);
        if asm.bytes_left == 0 {
            self.eop_pending = true;
            self.complete_rx(dev)?;
        }
        Ok(())
    }

    fn end_of_packet<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let (available, overflow) = dev.rx_fifo_status()?;
        if overflow {
            return self.resync(dev);
        }
        let Some(asm) = self.rx.as_mut() else {
            return Ok(());
        };
        if available < asm.bytes_left {
            debug!(
                "cc110x worker: end of packet with {} of {} bytes",
                available, asm.bytes_left
            );
            self.stats.invalid_packets += 1;
            return self.resync(dev);
        }
        let rest = dev.bus().read_fifo(asm.bytes_left)?;
        asm.frame.extend_from_slice(&rest);
        asm.bytes_left = 0;
        self.complete_rx(dev)
    }

    fn complete_rx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let Some(asm) = self.rx.take() else {
            return Ok(());
        };
        dev.apply(Transition::RxDone)?;

        let (body, rssi_raw, lqi) = if dev.status_appended() {
            match AppendedStatus::split(&asm.frame) {
                Some((body, status)) if status.crc_ok => (body, status.rssi_raw, status.lqi),
                _ => {
                    self.stats.crc_errors += 1;
                    debug!("cc110x worker: CRC error, dropping packet");
                    return self.rearm_rx(dev);
                }
            }
        } else {
            (&asm.frame[..], 0, 0)
        };

        match Packet::from_bytes(body) {
            Ok(packet) => {
                self.stats.packets_received += 1;
                debug!(
                    "cc110x worker: packet from {} to {} ({} bytes payload)",
                    packet.src,
                    packet.dest,
                    packet.payload.len()
                );
                self.emit(RadioEvent::PacketReceived(ReceivedPacket {
                    packet,
                    rssi_raw,
                    lqi,
                }));
            }
            Err(e) => {
                self.stats.invalid_packets += 1;
                debug!("cc110x worker: dropping packet: {}", e);
            }
        }
        self.rearm_rx(dev)
    }

    fn notify_available<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        let (available, overflow) = dev.rx_fifo_status()?;
        if overflow {
            return self.resync(dev);
        }
        if available == 0 {
            self.spurious(Gdo::Gdo2, dev.state());
            return Ok(());
        }
        self.stats.rx_notifications += 1;
        self.emit(RadioEvent::RxAvailable(available));
        Ok(())
    }

    /// Re-enable RX interrupts and the receiver without flushing.
    fn rearm_rx<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        dev.irq().enable(Gdo::Gdo0, Edge::Both);
        dev.irq().enable(Gdo::Gdo2, Edge::Rising);
        dev.bus().strobe(Strobe::Srx)?;
        Ok(())
    }

    /// Drop any packet in progress, flush the RX FIFO and restart RX.
    fn resync<T: SpiTransport, I: IrqControl>(
        &mut self,
        dev: &mut Cc110x<T, I>,
    ) -> RadioResult<(), T> {
        self.rx = None;
        self.eop_pending = false;
        self.stats.resyncs += 1;
        if self.tx.take().is_some() {
            self.emit(RadioEvent::TxFailed);
        }
        match dev.state() {
            RadioState::Unknown | RadioState::Pwd => {
                debug!("cc110x worker: resync skipped in state {}", dev.state());
                Ok(())
            }
            _ => {
                debug!("cc110x worker: resync");
                dev.switch_to_rx()
            }
        }
    }

    /// Best-effort return to a known state after a fault.
    fn recover<T: SpiTransport, I: IrqControl>(&mut self, dev: &mut Cc110x<T, I>) {
        if let Err(e) = self.resync(dev) {
            warn!("cc110x worker: recovery failed: {}", e);
        }
    }
}
