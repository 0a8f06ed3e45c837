//! CC110x driver façade.
//!
//! [`Cc110x`] owns the driver-visible state, the configured channel and
//! address, and the interrupt lines. Register writes that could race with
//! an active receiver are bracketed by stopping and restarting RX.

use super::bus::{SharedBus, SpiTransport};
use super::config::{Cc110xParams, RadioSettings, SettingsError};
use super::irq::{Edge, Gdo, IrqControl};
use super::packet::{AppendedStatus, Packet, PacketError};
use super::regs::{
    channel_register, frequency_word, MarcState, Strobe, ADDR, CHANNR, DEFAULT_CONFIG,
    DEFAULT_PATABLE, FIFO, FIFO_ERROR_FLAG, FIRST_STROBE, FREQ2, IOCFG0, IOCFG0_SYNC_WORD,
    IOCFG2, IOCFG2_RX_THRESHOLD, LAST_CONFIG_REGISTER, LAST_STROBE, MARCSTATE, MAX_ADDRESS,
    MAX_CHANNEL, MCSM2, MCSM2_RX_TIME_NONE, MIN_ADDRESS, NUM_BYTES_MASK, PATABLE, PATABLE_SIZE,
    PKTCTRL1, PKTCTRL1_ADDRESS_CHECK, PKTCTRL1_MONITOR, POWER_UP_WAIT_US, RESET_WAIT_US, RXBYTES,
    STATUS_BYTES,
};
use super::state::{IllegalTransition, RadioMode, RadioState, Transition};
use log::{debug, info, warn};
use std::fmt;

/// Errors returned by the driver façade.
#[derive(Debug)]
pub enum RadioError<E> {
    /// SPI or GPIO failure.
    Transport(E),
    /// Channel above `MAX_CHANNEL`.
    InvalidChannel(u8),
    /// Address outside `MIN_ADDRESS..=MAX_ADDRESS`.
    InvalidAddress(u16),
    /// Register address not valid for the requested access.
    InvalidRegister(u8),
    /// Invalid setup settings.
    Settings(SettingsError),
    /// Operation not allowed in the current state.
    State(IllegalTransition),
    /// Malformed packet in the RX FIFO.
    Packet(PacketError),
    /// RX FIFO overflowed, contents discarded.
    RxOverflow,
}

impl<E> From<E> for RadioError<E> {
    fn from(e: E) -> Self {
        Self::Transport(e)
    }
}

impl<E: fmt::Display> fmt::Display for RadioError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::InvalidChannel(ch) => {
                write!(f, "invalid channel {} (max {})", ch, MAX_CHANNEL)
            }
            Self::InvalidAddress(addr) => write!(
                f,
                "invalid address {} (valid {}..={})",
                addr, MIN_ADDRESS, MAX_ADDRESS
            ),
            Self::InvalidRegister(addr) => write!(f, "invalid register {:#04x}", addr),
            Self::Settings(e) => write!(f, "invalid settings: {}", e),
            Self::State(e) => write!(f, "{}", e),
            Self::Packet(e) => write!(f, "bad packet: {}", e),
            Self::RxOverflow => write!(f, "RX FIFO overflow"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RadioError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::State(e) => Some(e),
            Self::Packet(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> RadioError<E> {
    /// True for errors caused by the caller's arguments rather than the
    /// transceiver.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidChannel(_) | Self::InvalidAddress(_) | Self::InvalidRegister(_)
        )
    }
}

/// Result alias for façade operations.
pub type RadioResult<T, Tr> = Result<T, RadioError<<Tr as SpiTransport>::Error>>;

/// Snapshot returned by [`Cc110x::print_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigReport {
    pub state: RadioState,
    pub marc: MarcState,
    pub channel: u8,
    pub address: u8,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- cc110x configuration --")?;
        writeln!(f, "state:   {}", self.state)?;
        writeln!(f, "marc:    {}", self.marc)?;
        writeln!(f, "channel: {}", self.channel)?;
        write!(f, "address: {}", self.address)
    }
}

/// CC110x transceiver driver.
pub struct Cc110x<T: SpiTransport, I: IrqControl> {
    bus: SharedBus<T>,
    irq: I,
    params: Cc110xParams,
    state: RadioState,
    channel: u8,
    address: u8,
    base_frequency: [u8; 3],
    status_appended: bool,
    crc_errors: u32,
}

impl<T: SpiTransport, I: IrqControl> Cc110x<T, I> {
    /// Wrap a bus and interrupt lines. No I/O happens until [`setup`](Self::setup).
    pub fn new(bus: SharedBus<T>, irq: I, params: Cc110xParams) -> Self {
        Self {
            bus,
            irq,
            params,
            state: RadioState::Unknown,
            channel: 0,
            address: 0,
            base_frequency: [0; 3],
            status_appended: true,
            crc_errors: 0,
        }
    }

    /// Reset the chip and program the default configuration, PA table,
    /// base frequency, channel and address.
    pub fn setup(&mut self, settings: &RadioSettings) -> RadioResult<(), T> {
        settings.validate().map_err(RadioError::Settings)?;

        self.power_up_reset()?;
        self.bus.write_burst(IOCFG2, &DEFAULT_CONFIG)?;
        self.bus.write_burst(PATABLE, &DEFAULT_PATABLE)?;
        self.set_base_frequency(settings.band.base_frequency())?;
        self.set_channel(settings.channel)?;
        self.set_address(settings.address)?;

        info!(
            "cc110x: setup complete (cs={}, channel={}, address={}, band={:?})",
            self.params.cs, self.channel, self.address, settings.band
        );
        Ok(())
    }

    /// Chip select pulse followed by a software reset.
    pub fn power_up_reset(&mut self) -> RadioResult<(), T> {
        self.irq.disable(Gdo::Gdo0);
        self.irq.disable(Gdo::Gdo2);
        self.bus.pulse_select()?;
        self.bus.delay_us(POWER_UP_WAIT_US);
        self.reset()
    }

    /// Software reset (SRES). Leaves the driver in `Idle`.
    pub fn reset(&mut self) -> RadioResult<(), T> {
        self.wakeup_from_rx()?;
        self.bus.strobe(Strobe::Sres)?;
        self.bus.delay_us(RESET_WAIT_US);
        self.apply(Transition::Reset)?;
        debug!("cc110x: reset");
        Ok(())
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Configured channel number.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Configured node address.
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn base_frequency(&self) -> [u8; 3] {
        self.base_frequency
    }

    pub fn params(&self) -> &Cc110xParams {
        &self.params
    }

    /// Whether received frames carry the two appended status bytes.
    pub fn status_appended(&self) -> bool {
        self.status_appended
    }

    /// Frames dropped by [`read_packet`](Self::read_packet) for a bad CRC.
    pub fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    /// Override status-byte handling for transceivers (or simulators) that
    /// do not append RSSI / LQI.
    pub fn set_status_appended(&mut self, appended: bool) {
        self.status_appended = appended;
    }

    /// Set the node address. Before the first reset the value is only
    /// remembered; `setup` programs it.
    pub fn set_address(&mut self, address: u16) -> RadioResult<u8, T> {
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&address) {
            return Err(RadioError::InvalidAddress(address));
        }
        let address = address as u8;
        if self.state != RadioState::Unknown {
            self.write_register(ADDR, address)?;
        }
        self.address = address;
        Ok(address)
    }

    /// Select a channel. Out-of-range channels are rejected with no state
    /// change.
    pub fn set_channel(&mut self, channel: u8) -> RadioResult<u8, T> {
        if channel > MAX_CHANNEL {
            return Err(RadioError::InvalidChannel(channel));
        }
        if self.state != RadioState::Unknown {
            self.write_register(CHANNR, channel_register(channel))?;
        }
        self.channel = channel;
        Ok(channel)
    }

    /// Program FREQ2..FREQ0.
    pub fn set_base_frequency(&mut self, word: [u8; 3]) -> RadioResult<(), T> {
        self.write_burst_register(FREQ2, &word)?;
        self.base_frequency = word;
        Ok(())
    }

    /// Program the base frequency from a value in Hz.
    pub fn set_frequency_hz(&mut self, hz: u32) -> RadioResult<(), T> {
        self.set_base_frequency(frequency_word(hz))
    }

    /// Write one configuration register, pausing RX around the write.
    pub fn write_register(&mut self, addr: u8, value: u8) -> RadioResult<(), T> {
        if addr > LAST_CONFIG_REGISTER {
            return Err(RadioError::InvalidRegister(addr));
        }
        let guard = RxRestore::enter(self)?;
        guard.dev.bus.write_reg(addr, value)?;
        guard.finish()
    }

    /// Read one configuration register.
    pub fn read_register(&mut self, addr: u8) -> RadioResult<u8, T> {
        if addr > LAST_CONFIG_REGISTER {
            return Err(RadioError::InvalidRegister(addr));
        }
        Ok(self.bus.read_reg(addr)?)
    }

    /// Read a status register (0x30..=0x3D).
    pub fn read_status(&mut self, addr: u8) -> RadioResult<u8, T> {
        if !(FIRST_STROBE..=LAST_STROBE).contains(&addr) {
            return Err(RadioError::InvalidRegister(addr));
        }
        Ok(self.bus.read_status(addr)?)
    }

    /// Burst write starting at `addr`: a config register range, the
    /// PATABLE, or the TX FIFO. Config and PATABLE writes pause RX.
    pub fn write_burst_register(&mut self, addr: u8, data: &[u8]) -> RadioResult<(), T> {
        if addr == FIFO {
            return Ok(self.bus.write_burst(FIFO, data)?);
        }
        check_burst_range(addr, data.len())?;
        let guard = RxRestore::enter(self)?;
        guard.dev.bus.write_burst(addr, data)?;
        guard.finish()
    }

    /// Burst read starting at `addr`: a config register range, the
    /// PATABLE, or the RX FIFO.
    pub fn read_burst_register(&mut self, addr: u8, out: &mut [u8]) -> RadioResult<(), T> {
        if addr != FIFO {
            check_burst_range(addr, out.len())?;
        }
        Ok(self.bus.read_burst(addr, out)?)
    }

    /// Enter RX: GDO2 is masked while the RX FIFO is flushed and the GDO
    /// functions are programmed, then re-armed after SRX.
    pub fn switch_to_rx(&mut self) -> RadioResult<(), T> {
        self.state
            .next(Transition::EnterRx)
            .map_err(RadioError::State)?;
        self.irq.disable(Gdo::Gdo2);
        self.irq.disable(Gdo::Gdo0);
        self.bus.strobe(Strobe::Sidle)?;
        self.bus.strobe(Strobe::Sfrx)?;
        self.apply(Transition::EnterRx)?;
        self.bus.write_reg(IOCFG2, IOCFG2_RX_THRESHOLD)?;
        self.bus.write_reg(IOCFG0, IOCFG0_SYNC_WORD)?;
        self.bus.strobe(Strobe::Srx)?;
        self.irq.enable(Gdo::Gdo0, Edge::Both);
        self.irq.enable(Gdo::Gdo2, Edge::Rising);
        Ok(())
    }

    /// Disable the RX timeout and enter RX.
    pub fn setup_rx_mode(&mut self) -> RadioResult<(), T> {
        self.write_register(MCSM2, MCSM2_RX_TIME_NONE)?;
        self.switch_to_rx()
    }

    /// Leave RX for IDLE. No effect in any other state.
    pub fn wakeup_from_rx(&mut self) -> RadioResult<(), T> {
        if !self.state.is_receiving() {
            return Ok(());
        }
        self.bus.strobe(Strobe::Sidle)?;
        self.apply(Transition::WakeFromRx)?;
        Ok(())
    }

    /// Power down. Ends in `Pwd` from `Idle`, `Rx` or `Pwd`.
    pub fn switch_to_pwd(&mut self) -> RadioResult<(), T> {
        self.wakeup_from_rx()?;
        self.irq.disable(Gdo::Gdo0);
        self.irq.disable(Gdo::Gdo2);
        self.bus.strobe(Strobe::Spwd)?;
        self.apply(Transition::PowerDown)?;
        debug!("cc110x: powered down");
        Ok(())
    }

    /// Read the chip's MARCSTATE. The driver-visible state is unchanged
    /// afterwards.
    pub fn get_marc_state(&mut self) -> RadioResult<MarcState, T> {
        // Must be sampled before SIDLE.
        let raw = self.bus.read_status(MARCSTATE)?;
        let guard = RxRestore::enter(self)?;
        guard.finish()?;
        Ok(MarcState::from_raw(raw))
    }

    /// Log and return the current configuration.
    pub fn print_config(&mut self) -> RadioResult<ConfigReport, T> {
        let report = ConfigReport {
            state: self.state,
            marc: self.get_marc_state()?,
            channel: self.channel,
            address: self.address,
        };
        for line in report.to_string().lines() {
            info!("{}", line);
        }
        Ok(report)
    }

    /// Monitor mode disables hardware address filtering.
    pub fn set_monitor(&mut self, enabled: bool) -> RadioResult<(), T> {
        let value = if enabled {
            PKTCTRL1_MONITOR
        } else {
            PKTCTRL1_ADDRESS_CHECK
        };
        self.write_register(PKTCTRL1, value)
    }

    /// Switch the receiver on or off. Returns the mode before the call.
    pub fn set_mode(&mut self, mode: RadioMode) -> RadioResult<RadioMode, T> {
        let previous = if self.state == RadioState::Pwd || self.state == RadioState::Unknown {
            RadioMode::Off
        } else {
            RadioMode::On
        };
        match mode {
            RadioMode::On => self.setup_rx_mode()?,
            RadioMode::Off => self.switch_to_pwd()?,
            RadioMode::Get => {}
        }
        Ok(previous)
    }

    /// RX FIFO byte count and overflow flag.
    pub fn rx_fifo_status(&mut self) -> RadioResult<(usize, bool), T> {
        let raw = self.bus.read_status(RXBYTES)?;
        Ok(((raw & NUM_BYTES_MASK) as usize, raw & FIFO_ERROR_FLAG != 0))
    }

    /// Pull one complete packet out of the RX FIFO, if one is waiting.
    ///
    /// Used when the worker reports `RxAvailable`. On overflow, or when the
    /// FIFO holds less than the length byte announces, the FIFO is flushed
    /// and RX restarted. Frames failing the CRC are counted and dropped.
    pub fn read_packet(&mut self) -> RadioResult<Option<Packet>, T> {
        let (available, overflow) = self.rx_fifo_status()?;
        if overflow {
            warn!("cc110x: RX FIFO overflow, flushing");
            self.switch_to_rx()?;
            return Err(RadioError::RxOverflow);
        }
        if available == 0 {
            return Ok(None);
        }
        let length = self.bus.read_reg(FIFO)?;
        let trailer = if self.status_appended { STATUS_BYTES } else { 0 };
        let wanted = length as usize + trailer;
        if wanted > available - 1 {
            self.discard_rx()?;
            return Err(RadioError::Packet(PacketError::Truncated {
                expected: wanted + 1,
                actual: available,
            }));
        }
        let mut frame = Vec::with_capacity(1 + wanted);
        frame.push(length);
        frame.extend(self.bus.read_fifo(wanted)?);

        let body = if self.status_appended {
            match AppendedStatus::split(&frame) {
                Some((body, status)) if status.crc_ok => body,
                _ => {
                    self.crc_errors += 1;
                    debug!("cc110x: dropping frame with bad CRC");
                    return Ok(None);
                }
            }
        } else {
            &frame[..]
        };
        Packet::from_bytes(body)
            .map(Some)
            .map_err(RadioError::Packet)
    }

    /// Throw away whatever is left in the RX FIFO.
    fn discard_rx(&mut self) -> RadioResult<(), T> {
        if self.state.is_receiving() {
            self.switch_to_rx()
        } else {
            self.bus.strobe(Strobe::Sfrx)?;
            Ok(())
        }
    }

    pub(crate) fn bus(&self) -> &SharedBus<T> {
        &self.bus
    }

    pub(crate) fn irq(&self) -> &I {
        &self.irq
    }

    /// Move the state machine.
    pub(crate) fn apply(&mut self, event: Transition) -> RadioResult<RadioState, T> {
        let next = self.state.next(event).map_err(RadioError::State)?;
        if next != self.state {
            debug!("cc110x: {} -> {} ({:?})", self.state, next, event);
        }
        self.state = next;
        Ok(next)
    }
}

fn check_burst_range<E>(addr: u8, len: usize) -> Result<(), RadioError<E>> {
    let end = addr as usize + len;
    let ok = if addr == PATABLE {
        len <= PATABLE_SIZE
    } else {
        end <= LAST_CONFIG_REGISTER as usize + 1
    };
    if ok {
        Ok(())
    } else {
        Err(RadioError::InvalidRegister(addr))
    }
}

/// Stops RX for the duration of a register access and restarts it after.
///
/// Restart happens in [`finish`](Self::finish); if the guard is dropped on
/// an error path, `Drop` restarts RX and logs a failure.
struct RxRestore<'a, T: SpiTransport, I: IrqControl> {
    dev: &'a mut Cc110x<T, I>,
    resume: bool,
}

impl<'a, T: SpiTransport, I: IrqControl> RxRestore<'a, T, I> {
    fn enter(dev: &'a mut Cc110x<T, I>) -> RadioResult<Self, T> {
        let resume = dev.state.is_receiving();
        dev.wakeup_from_rx()?;
        Ok(Self { dev, resume })
    }

    fn finish(mut self) -> RadioResult<(), T> {
        if std::mem::take(&mut self.resume) {
            self.dev.switch_to_rx()
        } else {
            Ok(())
        }
    }
}

impl<T: SpiTransport, I: IrqControl> Drop for RxRestore<'_, T, I> {
    fn drop(&mut self) {
        if self.resume {
            if let Err(e) = self.dev.switch_to_rx() {
                warn!("cc110x: failed to restore RX: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::bus::mock::RecordingTransport;
    use crate::radio::irq::SoftIrqLines;
    use cc110x_rs_macros::device_test;

    type Dev = Cc110x<RecordingTransport, SoftIrqLines>;

    fn device() -> (Dev, SharedBus<RecordingTransport>, SoftIrqLines) {
        let bus = SharedBus::new(RecordingTransport::default());
        let lines = SoftIrqLines::new();
        let dev = Cc110x::new(bus.clone(), lines.clone(), Cc110xParams::default());
        (dev, bus, lines)
    }

    fn ready_device() -> (Dev, SharedBus<RecordingTransport>, SoftIrqLines) {
        let (mut dev, bus, lines) = device();
        dev.setup(&RadioSettings::default()).unwrap();
        bus.with(|t| t.transactions.clear());
        (dev, bus, lines)
    }

    #[device_test]
    fn setup_programs_chip_in_order() {
        let (mut dev, bus, _) = device();
        dev.setup(&RadioSettings {
            channel: 3,
            address: 42,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(dev.state(), RadioState::Idle);
        assert_eq!(dev.channel(), 3);
        assert_eq!(dev.address(), 42);

        bus.with(|t| {
            // The power-up pulse selects the chip without clocking any byte
            let txs: Vec<&Vec<u8>> = t.transactions.iter().filter(|tx| !tx.is_empty()).collect();
            let headers: Vec<u8> = txs.iter().map(|tx| tx[0]).collect();
            // SRES, config burst, PATABLE burst, FREQ burst, CHANNR, ADDR
            assert_eq!(headers, vec![0x30, 0x40, 0x7E, 0x4D, 0x0A, 0x09]);
            assert_eq!(txs[4], &vec![0x0A, 30]);
            assert_eq!(txs[5], &vec![0x09, 42]);
        });
    }

    #[device_test]
    fn setup_rejects_invalid_settings_without_io() {
        let (mut dev, bus, _) = device();
        let result = dev.setup(&RadioSettings {
            address: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(RadioError::Settings(_))));
        bus.with(|t| assert!(t.transactions.is_empty()));
    }

    #[device_test]
    fn channel_out_of_range_is_rejected() {
        let (mut dev, bus, _) = ready_device();
        assert!(matches!(
            dev.set_channel(MAX_CHANNEL + 1),
            Err(RadioError::InvalidChannel(25))
        ));
        assert_eq!(dev.channel(), 0);
        bus.with(|t| assert!(t.transactions.is_empty()));
    }

    #[device_test]
    fn channel_accepts_full_range() {
        let (mut dev, _, _) = ready_device();
        for ch in 0..=MAX_CHANNEL {
            assert_eq!(dev.set_channel(ch).unwrap(), ch);
            assert_eq!(dev.channel(), ch);
        }
    }

    #[device_test]
    fn address_range_enforced() {
        let (mut dev, _, _) = ready_device();
        assert!(matches!(dev.set_address(0), Err(RadioError::InvalidAddress(0))));
        assert!(matches!(
            dev.set_address(256),
            Err(RadioError::InvalidAddress(256))
        ));
        for addr in [1u16, 100, 255] {
            assert_eq!(dev.set_address(addr).unwrap() as u16, addr);
        }
    }

    #[device_test]
    fn write_in_rx_is_bracketed() {
        let (mut dev, bus, lines) = ready_device();
        dev.switch_to_rx().unwrap();
        bus.with(|t| t.transactions.clear());

        dev.write_register(CHANNR, 70).unwrap();

        assert_eq!(dev.state(), RadioState::Rx);
        assert!(lines.is_enabled(Gdo::Gdo2));
        bus.with(|t| {
            // SIDLE, write, then the RX entry sequence
            assert_eq!(t.transactions[0], vec![0x36]);
            assert_eq!(t.transactions[1], vec![0x0A, 70]);
            assert_eq!(t.transactions[2], vec![0x36]);
            assert_eq!(t.transactions[3], vec![0x3A]);
            assert_eq!(t.transactions.last(), Some(&vec![0x34]));
        });
    }

    #[device_test]
    fn write_in_idle_is_not_bracketed() {
        let (mut dev, bus, _) = ready_device();
        dev.write_register(CHANNR, 70).unwrap();
        bus.with(|t| assert_eq!(t.transactions, vec![vec![0x0A, 70]]));
        assert_eq!(dev.state(), RadioState::Idle);
    }

    #[device_test]
    fn invalid_register_addresses() {
        let (mut dev, _, _) = ready_device();
        assert!(matches!(
            dev.write_register(0x2F, 0),
            Err(RadioError::InvalidRegister(0x2F))
        ));
        assert!(matches!(
            dev.read_status(0x2E),
            Err(RadioError::InvalidRegister(0x2E))
        ));
        assert!(matches!(
            dev.write_burst_register(PATABLE, &[0; 9]),
            Err(RadioError::InvalidRegister(PATABLE))
        ));
        assert!(matches!(
            dev.write_burst_register(0x2C, &[0; 4]),
            Err(RadioError::InvalidRegister(0x2C))
        ));
    }

    #[device_test]
    fn switch_to_pwd_from_every_state() {
        let (mut dev, _, lines) = ready_device();
        dev.switch_to_pwd().unwrap();
        assert_eq!(dev.state(), RadioState::Pwd);

        dev.switch_to_pwd().unwrap();
        assert_eq!(dev.state(), RadioState::Pwd);

        dev.switch_to_rx().unwrap();
        dev.switch_to_pwd().unwrap();
        assert_eq!(dev.state(), RadioState::Pwd);
        assert!(!lines.is_enabled(Gdo::Gdo2));
    }

    #[device_test]
    fn marc_state_read_keeps_rx() {
        let (mut dev, bus, _) = ready_device();
        dev.switch_to_rx().unwrap();
        bus.with(|t| {
            t.transactions.clear();
            // header status + MARCSTATE value, read while still in RX
            t.responses.extend([0x00, 0x0D]);
        });
        let marc = dev.get_marc_state().unwrap();
        assert_eq!(marc, MarcState::RX);
        assert_eq!(dev.state(), RadioState::Rx);
        bus.with(|t| {
            assert_eq!(t.transactions[0], vec![0xF5, 0x00]);
            assert_eq!(t.transactions[1], vec![0x36]);
            assert_eq!(t.transactions.last(), Some(&vec![0x34]));
        });
    }

    #[device_test]
    fn crc_failure_is_dropped_and_counted() {
        let (mut dev, bus, _) = ready_device();
        dev.switch_to_rx().unwrap();
        bus.with(|t| {
            t.transactions.clear();
            // RXBYTES = 7, length 4, then dst/src/flags/payload + RSSI/LQI
            // with the CRC_OK bit clear.
            t.responses
                .extend([0x00, 0x07, 0x00, 0x04, 0x00, 0x00, 0x09, 0x00, 0xAA, 0x20, 0x05]);
        });
        assert_eq!(dev.read_packet().unwrap(), None);
        assert_eq!(dev.crc_errors(), 1);
        assert_eq!(dev.state(), RadioState::Rx);
    }

    #[device_test]
    fn truncated_packet_flushes_fifo() {
        let (mut dev, bus, _) = ready_device();
        dev.switch_to_rx().unwrap();
        bus.with(|t| {
            t.transactions.clear();
            // RXBYTES = 3, but the length byte announces 10
            t.responses.extend([0x00, 0x03, 0x00, 0x0A]);
        });
        match dev.read_packet() {
            Err(RadioError::Packet(PacketError::Truncated { expected, actual })) => {
                assert_eq!(expected, 13);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(dev.state(), RadioState::Rx);
        bus.with(|t| {
            assert!(t.transactions.contains(&vec![0x3A]));
            assert_eq!(t.transactions.last(), Some(&vec![0x34]));
        });
    }

    #[device_test]
    fn set_mode_reports_previous() {
        let (mut dev, _, _) = ready_device();
        assert_eq!(dev.set_mode(RadioMode::Get).unwrap(), RadioMode::On);
        assert_eq!(dev.set_mode(RadioMode::Off).unwrap(), RadioMode::On);
        assert_eq!(dev.state(), RadioState::Pwd);
        assert_eq!(dev.set_mode(RadioMode::On).unwrap(), RadioMode::Off);
        assert_eq!(dev.state(), RadioState::Rx);
    }

    #[device_test]
    fn monitor_mode_register_values() {
        let (mut dev, bus, _) = ready_device();
        dev.set_monitor(true).unwrap();
        dev.set_monitor(false).unwrap();
        bus.with(|t| {
            assert_eq!(t.transactions[0], vec![0x07, 0x04]);
            assert_eq!(t.transactions[1], vec![0x07, 0x06]);
        });
    }

    #[device_test]
    fn operations_before_setup() {
        let (mut dev, bus, _) = device();
        assert_eq!(dev.set_channel(4).unwrap(), 4);
        assert!(matches!(
            dev.switch_to_rx(),
            Err(RadioError::State(IllegalTransition {
                from: RadioState::Unknown,
                ..
            }))
        ));
        bus.with(|t| assert!(t.transactions.is_empty()));
    }

    #[device_test]
    fn config_report_format() {
        let report = ConfigReport {
            state: RadioState::Rx,
            marc: MarcState::RX,
            channel: 5,
            address: 9,
        };
        let text = report.to_string();
        assert!(text.contains("state:   RX"));
        assert!(text.contains("channel: 5"));
        assert!(text.contains("address: 9"));
    }
}
