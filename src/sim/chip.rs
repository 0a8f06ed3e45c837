//! Register-level CC110x model.
//!
//! [`SimulatedChip`] implements [`SpiTransport`], so the real driver and
//! worker run against it unchanged. It keeps the configuration registers,
//! PA table, both 64-byte FIFOs and the MARC state, and raises GDO edges
//! through the same [`InterruptSink`] a GPIO ISR would use.
//!
//! Transmitted frames leave through a [`FrameSink`] wrapped in the tunnel
//! encapsulation; inbound tunnel frames enter through
//! [`SimulatedChip::receive`].
//!
//! # Interrupt model
//!
//! | Line | Mode | Raised when |
//! |------|------|-------------|
//! | GDO2 | RX   | FIFO holds a whole frame (default) or reaches the threshold (sync mode) |
//! | GDO0 | RX   | sync word and end of packet (sync mode only) |
//! | GDO2 | TX   | TX FIFO drained before the frame is complete |
//! | GDO0 | TX   | frame sent |

use super::io::FrameSink;
use super::tunnel::{encapsulate, TunnelConfig, TunnelFrame};
use crate::radio::bus::SpiTransport;
use crate::radio::fifo::HwFifo;
use crate::radio::header::{ProtocolFault, SpiHeader, Target};
use crate::radio::irq::{Gdo, InterruptSink, IrqControl, SoftIrqLines};
use crate::radio::regs::{
    MarcState, Strobe, ADDR, CHANNEL_SPACING, CHANNR, CHIP_VERSION, CONFIG_REGISTER_COUNT,
    CRC_OK, DEFAULT_CONFIG, DEFAULT_PATABLE, FIFO_ERROR_FLAG, LAST_STROBE, LQI, LQI_EST,
    MARCSTATE, MCSM1, NUM_BYTES_MASK, PARTNUM, PART_NUMBER, PATABLE_SIZE, PKTCTRL1, RSSI,
    RXBYTES, RX_FIFO_THRESHOLD, TXBYTES, VERSION,
};
use log::{debug, error, trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Simulator behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Panic on SPI protocol violations instead of returning an error.
    pub fatal_faults: bool,
    /// Append RSSI and LQI|CRC_OK to every received frame.
    pub append_status: bool,
    /// Raise sync / threshold / end-of-packet edges and stream long
    /// frames through the FIFO, instead of one GDO2 per whole frame.
    pub sync_interrupts: bool,
    /// Raw RSSI reported for received frames.
    pub rssi: u8,
    /// LQI reported for received frames.
    pub lqi: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fatal_faults: true,
            append_status: false,
            sync_interrupts: false,
            rssi: 0x40,
            lqi: 0x2F,
        }
    }
}

/// Error returned by the simulated transport when faults are not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Protocol(ProtocolFault),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(fault) => write!(f, "cc110x simulator: {}", fault),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(fault) => Some(fault),
        }
    }
}

impl From<ProtocolFault> for SimError {
    fn from(fault: ProtocolFault) -> Self {
        Self::Protocol(fault)
    }
}

/// Simulator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub frames_sent: u32,
    pub frames_received: u32,
    /// Inbound frames ignored (wrong channel, not listening, filtered).
    pub frames_dropped: u32,
    pub rx_overflows: u32,
    pub faults: u32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Deselected,
    Header,
    Access {
        header: SpiHeader,
        target: Target,
        offset: u8,
    },
}

/// Software model of one CC110x.
pub struct SimulatedChip {
    config: SimConfig,
    tunnel: TunnelConfig,
    regs: [u8; CONFIG_REGISTER_COUNT],
    patable: [u8; PATABLE_SIZE],
    rx_fifo: HwFifo,
    tx_fifo: HwFifo,
    /// Received bytes not yet moved into the RX FIFO (sync mode).
    rx_pending: VecDeque<u8>,
    rx_overflow: bool,
    /// Bytes shifted out of the TX FIFO for the frame on air.
    air: Vec<u8>,
    marc: MarcState,
    sleeping: bool,
    sleep_requested: bool,
    phase: Phase,
    tx_written: usize,
    rx_read: bool,
    sink: Option<Box<dyn FrameSink + Send>>,
    irq: Option<(SoftIrqLines, Arc<dyn InterruptSink>)>,
    tx_bursts: Vec<usize>,
    strobes: Vec<Strobe>,
    stats: SimStats,
}

impl SimulatedChip {
    pub fn new(config: SimConfig, tunnel: TunnelConfig) -> Self {
        let mut chip = Self {
            config,
            tunnel,
            regs: [0; CONFIG_REGISTER_COUNT],
            patable: DEFAULT_PATABLE,
            rx_fifo: HwFifo::new(),
            tx_fifo: HwFifo::new(),
            rx_pending: VecDeque::new(),
            rx_overflow: false,
            air: Vec::new(),
            marc: MarcState::IDLE,
            sleeping: false,
            sleep_requested: false,
            phase: Phase::Deselected,
            tx_written: 0,
            rx_read: false,
            sink: None,
            irq: None,
            tx_bursts: Vec::new(),
            strobes: Vec::new(),
            stats: SimStats::default(),
        };
        chip.load_defaults();
        chip
    }

    /// Route transmitted frames to `sink`.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink + Send>) {
        self.sink = Some(sink);
    }

    /// Wire the GDO outputs. Edges are delivered only while `lines` has
    /// the line enabled, like a masked GPIO interrupt.
    pub fn connect_interrupts(&mut self, lines: SoftIrqLines, sink: Arc<dyn InterruptSink>) {
        self.irq = Some((lines, sink));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tunnel_config(&self) -> &TunnelConfig {
        &self.tunnel
    }

    pub fn marc_state(&self) -> MarcState {
        self.marc
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Configuration register value, `None` outside 0x00..=0x2E.
    pub fn register(&self, addr: u8) -> Option<u8> {
        self.regs.get(addr as usize).copied()
    }

    pub fn patable(&self) -> &[u8; PATABLE_SIZE] {
        &self.patable
    }

    /// Channel number derived from CHANNR.
    pub fn channel(&self) -> u8 {
        self.regs[CHANNR as usize] / CHANNEL_SPACING
    }

    pub fn rx_fifo_len(&self) -> usize {
        self.rx_fifo.len()
    }

    pub fn tx_fifo_len(&self) -> usize {
        self.tx_fifo.len()
    }

    /// Length of every TX FIFO burst, in order.
    pub fn tx_bursts(&self) -> &[usize] {
        &self.tx_bursts
    }

    /// Every strobe received, in order.
    pub fn strobes(&self) -> &[Strobe] {
        &self.strobes
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    fn load_defaults(&mut self) {
        self.regs = [0; CONFIG_REGISTER_COUNT];
        self.regs[..DEFAULT_CONFIG.len()].copy_from_slice(&DEFAULT_CONFIG);
        self.patable = DEFAULT_PATABLE;
    }

    fn raise(&self, line: Gdo) {
        match &self.irq {
            Some((lines, sink)) if lines.is_enabled(line) => sink.raise(line),
            Some(_) => trace!("sim: {:?} masked", line),
            None => {}
        }
    }

    fn fault(&mut self, fault: ProtocolFault) -> SimError {
        self.stats.faults += 1;
        self.phase = match self.phase {
            Phase::Deselected => Phase::Deselected,
            _ => Phase::Header,
        };
        error!("sim: {} (marc {})", fault, self.marc);
        if self.config.fatal_faults {
            panic!("cc110x simulator: {}", fault);
        }
        SimError::Protocol(fault)
    }

    /// Chip status byte: state field plus FIFO byte count.
    fn status_byte(&self, read: bool) -> u8 {
        let count = if read {
            self.rx_fifo.len()
        } else {
            self.tx_fifo.free()
        };
        self.marc.status_bits() | count.min(15) as u8
    }

    fn status_register(&self, addr: u8) -> u8 {
        match addr {
            PARTNUM => PART_NUMBER,
            VERSION => CHIP_VERSION,
            LQI => (self.config.lqi & LQI_EST) | CRC_OK,
            RSSI => self.config.rssi,
            MARCSTATE => self.marc.raw(),
            TXBYTES => {
                let underflow = self.marc == MarcState::TXFIFO_UNDERFLOW;
                (self.tx_fifo.len() as u8 & NUM_BYTES_MASK)
                    | if underflow { FIFO_ERROR_FLAG } else { 0 }
            }
            RXBYTES => {
                (self.rx_fifo.len() as u8 & NUM_BYTES_MASK)
                    | if self.rx_overflow { FIFO_ERROR_FLAG } else { 0 }
            }
            _ => 0,
        }
    }

    // ==================== Strobes ====================

    fn strobe(&mut self, strobe: Strobe) {
        trace!("sim: strobe {} in {}", strobe, self.marc);
        self.strobes.push(strobe);
        match strobe {
            Strobe::Sres => {
                self.load_defaults();
                self.flush_rx();
                self.tx_fifo.flush();
                self.air.clear();
                self.marc = MarcState::IDLE;
            }
            Strobe::Sfstxon => self.marc = MarcState::FSTXON,
            Strobe::Sxoff => self.marc = MarcState::XOFF,
            Strobe::Scal => self.marc = MarcState::IDLE,
            Strobe::Srx => {
                if self.marc == MarcState::RXFIFO_OVERFLOW {
                    debug!("sim: SRX ignored until SFRX");
                } else {
                    self.marc = MarcState::RX;
                }
            }
            Strobe::Stx => self.start_tx(),
            Strobe::Sidle => {
                if !self.air.is_empty() {
                    debug!("sim: TX aborted with {} bytes on air", self.air.len());
                    self.air.clear();
                }
                self.marc = MarcState::IDLE;
            }
            Strobe::Spwd => self.sleep_requested = true,
            Strobe::Sfrx => {
                self.flush_rx();
                if self.marc == MarcState::RXFIFO_OVERFLOW {
                    self.marc = MarcState::IDLE;
                }
            }
            Strobe::Sftx => {
                self.tx_fifo.flush();
                self.air.clear();
                if self.marc == MarcState::TXFIFO_UNDERFLOW {
                    self.marc = MarcState::IDLE;
                }
            }
            Strobe::Safc | Strobe::Swor | Strobe::Sworrst | Strobe::Snop => {}
        }
    }

    fn flush_rx(&mut self) {
        self.rx_fifo.flush();
        self.rx_pending.clear();
        self.rx_overflow = false;
    }

    // ==================== Transmit ====================

    fn start_tx(&mut self) {
        if self.tx_fifo.is_empty() && self.air.is_empty() {
            debug!("sim: STX with empty TX FIFO");
            self.marc = MarcState::TXFIFO_UNDERFLOW;
            return;
        }
        self.marc = MarcState::TX;
        self.shift_out();
    }

    /// Move the TX FIFO onto the air and finish the frame once its
    /// length byte is satisfied.
    fn shift_out(&mut self) {
        self.air.extend(self.tx_fifo.drain_all());
        let Some(&length) = self.air.first() else {
            return;
        };
        let expected = length as usize + 1;
        if self.air.len() < expected {
            self.raise(Gdo::Gdo2);
            return;
        }
        if self.air.len() > expected {
            warn!(
                "sim: {} bytes beyond the frame length discarded",
                self.air.len() - expected
            );
        }
        let frame: Vec<u8> = self.air.drain(..).take(expected).collect();
        self.transmit(&frame);
        self.marc = match self.regs[MCSM1 as usize] & 0x03 {
            1 => MarcState::FSTXON,
            3 => MarcState::RX,
            _ => MarcState::IDLE,
        };
        self.raise(Gdo::Gdo0);
    }

    fn transmit(&mut self, frame: &[u8]) {
        let channel = self.channel();
        let wire = match encapsulate(&self.tunnel, channel, frame) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("sim: cannot encapsulate {} byte frame: {}", frame.len(), e);
                return;
            }
        };
        self.stats.frames_sent += 1;
        debug!("sim: sent {} byte frame on channel {}", frame.len(), channel);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.send_frame(&wire) {
                warn!("sim: tunnel write failed: {}", e);
            }
        }
    }

    // ==================== Receive ====================

    fn accepts(&self, radio: &[u8]) -> bool {
        let Some(&dest) = radio.get(1) else {
            return false;
        };
        let own = self.regs[ADDR as usize];
        match self.regs[PKTCTRL1 as usize] & 0x03 {
            0 => true,
            1 => dest == own,
            2 => dest == own || dest == 0,
            _ => dest == own || dest == 0 || dest == 0xFF,
        }
    }

    /// Offer an inbound tunnel frame to the receiver. Returns whether the
    /// chip accepted it.
    pub fn receive(&mut self, frame: &TunnelFrame) -> bool {
        if frame.channel != self.channel() {
            trace!(
                "sim: frame for channel {} ignored on channel {}",
                frame.channel,
                self.channel()
            );
            self.stats.frames_dropped += 1;
            return false;
        }
        if self.marc != MarcState::RX {
            trace!("sim: frame ignored in {}", self.marc);
            self.stats.frames_dropped += 1;
            return false;
        }
        if !self.accepts(&frame.radio) {
            trace!("sim: frame filtered by address check");
            self.stats.frames_dropped += 1;
            return false;
        }

        let mut bytes = frame.radio.clone();
        if self.config.append_status {
            bytes.push(self.config.rssi);
            bytes.push((self.config.lqi & LQI_EST) | CRC_OK);
        }
        self.stats.frames_received += 1;
        debug!("sim: receiving {} bytes on channel {}", bytes.len(), frame.channel);

        if self.config.sync_interrupts {
            self.rx_pending.extend(bytes);
            self.fill_rx_fifo();
            self.raise(Gdo::Gdo0);
            self.signal_rx_progress();
        } else if self.rx_fifo.push_slice(&bytes).is_err() {
            warn!("sim: RX FIFO overflow ({} bytes dropped)", bytes.len());
            self.stats.rx_overflows += 1;
            self.rx_overflow = true;
            self.marc = MarcState::RXFIFO_OVERFLOW;
            self.raise(Gdo::Gdo2);
        } else {
            self.raise(Gdo::Gdo2);
        }
        true
    }

    fn fill_rx_fifo(&mut self) {
        let n = self.rx_fifo.free().min(self.rx_pending.len());
        for byte in self.rx_pending.drain(..n) {
            // Cannot fail: `n` is bounded by the free space.
            let _ = self.rx_fifo.push(byte);
        }
    }

    fn signal_rx_progress(&mut self) {
        if self.rx_pending.is_empty() {
            self.raise(Gdo::Gdo0);
        } else if self.rx_fifo.len() >= RX_FIFO_THRESHOLD {
            self.raise(Gdo::Gdo2);
        }
    }

    // ==================== SPI ====================

    fn access(&mut self, header: SpiHeader, target: Target, offset: u8, byte: u8) -> Result<u8, SimError> {
        let read = header.mode().is_read();
        let status = self.status_byte(read);
        match target {
            Target::Config(base) => {
                let addr = base as usize + offset as usize;
                if addr >= CONFIG_REGISTER_COUNT {
                    return Err(self.fault(ProtocolFault::InvalidAddress(addr as u8)));
                }
                if read {
                    Ok(self.regs[addr])
                } else {
                    self.regs[addr] = byte;
                    Ok(status)
                }
            }
            Target::Status(base) => {
                let addr = base.saturating_add(offset);
                if addr > LAST_STROBE {
                    return Err(self.fault(ProtocolFault::InvalidAddress(addr)));
                }
                Ok(self.status_register(addr))
            }
            Target::PaTable => {
                let index = offset as usize % PATABLE_SIZE;
                if read {
                    Ok(self.patable[index])
                } else {
                    self.patable[index] = byte;
                    Ok(status)
                }
            }
            Target::TxFifo => {
                if self.tx_fifo.push(byte).is_err() {
                    return Err(self.fault(ProtocolFault::TxFifoOverflow));
                }
                self.tx_written += 1;
                Ok(status)
            }
            Target::RxFifo => match self.rx_fifo.pop() {
                Ok(value) => {
                    self.rx_read = true;
                    Ok(value)
                }
                Err(_) => Err(self.fault(ProtocolFault::RxFifoUnderflow)),
            },
            Target::Strobe(strobe) => {
                self.strobe(strobe);
                Ok(status)
            }
        }
    }
}

impl SpiTransport for SimulatedChip {
    type Error = SimError;

    fn select(&mut self) -> Result<(), SimError> {
        if self.sleeping {
            debug!("sim: woken by chip select");
            self.sleeping = false;
            self.marc = MarcState::IDLE;
        }
        self.phase = Phase::Header;
        self.tx_written = 0;
        self.rx_read = false;
        Ok(())
    }

    fn transfer(&mut self, out: u8) -> Result<u8, SimError> {
        match self.phase {
            Phase::Deselected => Err(self.fault(ProtocolFault::NotSelected)),
            Phase::Header => {
                let header = SpiHeader::decode(out);
                let target = header.target().map_err(|f| self.fault(f))?;
                let status = self.status_byte(header.mode().is_read());
                match target {
                    // A strobe is complete after its header byte.
                    Target::Strobe(strobe) => self.strobe(strobe),
                    _ => {
                        self.phase = Phase::Access {
                            header,
                            target,
                            offset: 0,
                        }
                    }
                }
                Ok(status)
            }
            Phase::Access {
                header,
                target,
                offset,
            } => {
                let value = self.access(header, target, offset, out)?;
                self.phase = if header.mode().is_burst() {
                    Phase::Access {
                        header,
                        target,
                        offset: offset.wrapping_add(1),
                    }
                } else {
                    Phase::Header
                };
                Ok(value)
            }
        }
    }

    fn deselect(&mut self) -> Result<(), SimError> {
        if matches!(self.phase, Phase::Deselected) {
            return Ok(());
        }
        self.phase = Phase::Deselected;

        if self.tx_written > 0 {
            self.tx_bursts.push(self.tx_written);
            self.tx_written = 0;
            if self.marc == MarcState::TX {
                self.shift_out();
            }
        }
        if self.rx_read {
            self.rx_read = false;
            if !self.rx_pending.is_empty() {
                self.fill_rx_fifo();
                self.signal_rx_progress();
            }
        }
        if self.sleep_requested {
            self.sleep_requested = false;
            self.sleeping = true;
            self.marc = MarcState::SLEEP;
            debug!("sim: powered down");
        }
        Ok(())
    }

    fn delay_us(&mut self, _us: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::bus::SharedBus;
    use crate::radio::irq::Edge;
    use crate::radio::regs::{FIFO, IOCFG2, PATABLE};
    use crate::sim::io::MemoryLink;
    use crate::sim::tunnel::decapsulate;
    use cc110x_rs_macros::device_test;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Edges(Mutex<Vec<Gdo>>);

    impl InterruptSink for Edges {
        fn raise(&self, line: Gdo) {
            self.0.lock().unwrap().push(line);
        }
    }

    fn chip(config: SimConfig) -> (SharedBus<SimulatedChip>, SoftIrqLines, Arc<Edges>) {
        let lines = SoftIrqLines::new();
        let edges = Arc::new(Edges::default());
        let mut chip = SimulatedChip::new(config, TunnelConfig::default());
        chip.connect_interrupts(lines.clone(), edges.clone());
        (SharedBus::new(chip), lines, edges)
    }

    fn inbound(channel: u8, radio: Vec<u8>) -> TunnelFrame {
        TunnelFrame {
            source_mac: [0x02, 0, 0, 0, 0, 9],
            source_ip: std::net::Ipv4Addr::new(10, 0, 0, 9),
            channel,
            device_id: 9,
            lqi: 0,
            radio,
        }
    }

    #[device_test]
    fn reset_loads_defaults() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.write_reg(IOCFG2, 0x55).unwrap();
        bus.strobe(Strobe::Sres).unwrap();
        assert_eq!(bus.read_reg(IOCFG2).unwrap(), DEFAULT_CONFIG[0]);
        assert_eq!(bus.read_status(VERSION).unwrap(), CHIP_VERSION);
        assert_eq!(bus.read_status(MARCSTATE).unwrap(), MarcState::IDLE.raw());
    }

    #[device_test]
    fn burst_writes_walk_registers_and_patable() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.write_burst(CHANNR, &[30, 0x0C]).unwrap();
        bus.write_burst(PATABLE, &[1, 2, 3]).unwrap();
        bus.with(|c| {
            assert_eq!(c.channel(), 3);
            assert_eq!(c.register(CHANNR + 1), Some(0x0C));
            assert_eq!(&c.patable()[..3], &[1, 2, 3]);
        });
    }

    #[device_test]
    fn power_down_until_next_select() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.strobe(Strobe::Spwd).unwrap();
        bus.with(|c| assert!(c.is_sleeping()));
        assert_eq!(bus.read_status(MARCSTATE).unwrap(), MarcState::IDLE.raw());
    }

    #[device_test]
    fn whole_frame_raises_gdo2() {
        let (bus, lines, edges) = chip(SimConfig::default());
        lines.enable(Gdo::Gdo2, Edge::Rising);
        bus.strobe(Strobe::Srx).unwrap();
        let frame = vec![4, 0, 2, 0, 0xAA];
        assert!(bus.with(|c| c.receive(&inbound(0, frame.clone()))));
        assert_eq!(*edges.0.lock().unwrap(), vec![Gdo::Gdo2]);
        assert_eq!(bus.read_status(RXBYTES).unwrap(), 5);
        assert_eq!(bus.read_fifo(5).unwrap(), frame);
    }

    #[device_test]
    fn frames_outside_rx_or_channel_are_dropped() {
        let (bus, _, _) = chip(SimConfig::default());
        let frame = vec![3, 0, 2, 0];
        assert!(!bus.with(|c| c.receive(&inbound(0, frame.clone()))));
        bus.strobe(Strobe::Srx).unwrap();
        assert!(!bus.with(|c| c.receive(&inbound(7, frame))));
        bus.with(|c| assert_eq!(c.stats().frames_dropped, 2));
    }

    #[device_test]
    fn address_check_filters_unicast() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.write_reg(ADDR, 5).unwrap();
        bus.strobe(Strobe::Srx).unwrap();
        assert!(!bus.with(|c| c.receive(&inbound(0, vec![3, 6, 2, 0]))));
        assert!(bus.with(|c| c.receive(&inbound(0, vec![3, 5, 2, 0]))));
    }

    #[device_test]
    fn overflow_sets_error_flag() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.strobe(Strobe::Srx).unwrap();
        let mut frame = vec![69, 0, 1, 0];
        frame.resize(70, 0x11);
        bus.with(|c| c.receive(&inbound(0, frame)));
        let raw = bus.read_status(RXBYTES).unwrap();
        assert_ne!(raw & FIFO_ERROR_FLAG, 0);
        assert_eq!(bus.read_status(MARCSTATE).unwrap(), MarcState::RXFIFO_OVERFLOW.raw());
        bus.strobe(Strobe::Sfrx).unwrap();
        assert_eq!(bus.read_status(RXBYTES).unwrap(), 0);
    }

    #[device_test]
    fn transmit_completes_after_length_byte_satisfied() {
        let link = MemoryLink::new();
        let tap = link.port();
        let (bus, lines, edges) = chip(SimConfig::default());
        bus.with(|c| c.set_sink(Box::new(link.port())));
        lines.enable(Gdo::Gdo0, Edge::Falling);
        lines.enable(Gdo::Gdo2, Edge::Falling);

        let frame: Vec<u8> = std::iter::once(69).chain(0..69).collect();
        bus.write_burst(FIFO, &frame[..60]).unwrap();
        bus.strobe(Strobe::Stx).unwrap();
        assert_eq!(*edges.0.lock().unwrap(), vec![Gdo::Gdo2]);
        bus.write_burst(FIFO, &frame[60..]).unwrap();
        assert_eq!(*edges.0.lock().unwrap(), vec![Gdo::Gdo2, Gdo::Gdo0]);

        bus.with(|c| {
            assert_eq!(c.tx_bursts(), &[60, 10]);
            assert_eq!(c.stats().frames_sent, 1);
        });
        let wire = tap.recv().unwrap();
        let decoded = decapsulate(&wire).unwrap().unwrap();
        assert_eq!(decoded.radio, frame);
    }

    #[device_test]
    fn stx_with_empty_fifo_underflows() {
        let (bus, _, _) = chip(SimConfig::default());
        bus.strobe(Strobe::Stx).unwrap();
        assert_eq!(
            bus.read_status(MARCSTATE).unwrap(),
            MarcState::TXFIFO_UNDERFLOW.raw()
        );
    }

    #[device_test]
    fn non_fatal_fault_returns_error() {
        let config = SimConfig {
            fatal_faults: false,
            ..SimConfig::default()
        };
        let (bus, _, _) = chip(config);
        let err = bus.read_fifo(2).unwrap_err();
        assert_eq!(err, SimError::Protocol(ProtocolFault::RxFifoUnderflow));
        let err = bus.read_reg(0x2F).unwrap_err();
        assert_eq!(err, SimError::Protocol(ProtocolFault::InvalidAddress(0x2F)));
        bus.with(|c| assert_eq!(c.stats().faults, 2));
    }

    #[device_test]
    #[should_panic(expected = "TX FIFO overflow")]
    fn fatal_fault_panics() {
        let (bus, _, _) = chip(SimConfig::default());
        let _ = bus.write_burst(FIFO, &[0; 65]);
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use crate::radio::bus::SharedBus;
    use cc110x_rs_macros::tap_test;

    fn bus() -> SharedBus<SimulatedChip> {
        SharedBus::new(SimulatedChip::new(SimConfig::default(), TunnelConfig::default()))
    }

    #[tap_test]
    fn reports_part_and_version() {
        let bus = bus();
        assert_eq!(bus.read_status(PARTNUM).unwrap(), PART_NUMBER);
        assert_eq!(bus.read_status(VERSION).unwrap(), CHIP_VERSION);
    }

    #[tap_test(should_panic = "RX FIFO underflow")]
    fn empty_rx_fifo_read_faults() {
        let _ = bus().read_fifo(1);
    }
}
