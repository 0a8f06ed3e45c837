//! Driver, worker and simulated chip end to end.

use super::chip::{SimConfig, SimulatedChip};
use super::io::{Delivery, MemoryLink, MemoryPort, TunnelPump};
use super::tunnel::{decapsulate, encapsulate, TunnelConfig};
use crate::radio::bus::SharedBus;
use crate::radio::config::{Cc110xParams, RadioSettings};
use crate::radio::device::Cc110x;
use crate::radio::dispatcher::{mailbox, MailboxHandle, RadioEvent, RadioMessage, Worker};
use crate::radio::irq::SoftIrqLines;
use crate::radio::packet::Packet;
use crate::radio::regs::{MarcState, Strobe, FIFO};
use crate::radio::state::RadioState;
use cc110x_rs_macros::device_test;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

struct Node {
    bus: SharedBus<SimulatedChip>,
    dev: Cc110x<SimulatedChip, SoftIrqLines>,
    worker: Worker,
    events: UnboundedReceiver<RadioEvent>,
    handle: MailboxHandle,
    pump: TunnelPump,
    port: MemoryPort,
}

impl Node {
    fn new(link: &MemoryLink, host: u8, config: SimConfig, settings: RadioSettings) -> Self {
        let tunnel = TunnelConfig {
            mac: [0x02, 0, 0, 0, 0, host],
            source_ip: Ipv4Addr::new(10, 0, 0, host),
            ..TunnelConfig::default()
        };
        let port = link.port();
        let lines = SoftIrqLines::new();
        let (handle, mbox) = mailbox();

        let mut chip = SimulatedChip::new(config, tunnel);
        chip.set_sink(Box::new(port.clone()));
        chip.connect_interrupts(lines.clone(), Arc::new(handle.clone()));
        let bus = SharedBus::new(chip);

        let mut dev = Cc110x::new(bus.clone(), lines, Cc110xParams::default());
        dev.set_status_appended(config.append_status);
        dev.setup(&settings).unwrap();
        let (worker, events) = Worker::new(mbox);
        Self {
            pump: TunnelPump::new(bus.clone()),
            bus,
            dev,
            worker,
            events,
            handle,
            port,
        }
    }

    fn listening(link: &MemoryLink, host: u8, config: SimConfig, settings: RadioSettings) -> Self {
        let mut node = Self::new(link, host, config, settings);
        node.handle.post(RadioMessage::InitMode).unwrap();
        node.settle();
        assert_eq!(node.dev.state(), RadioState::Rx);
        node
    }

    /// Deliver inbound frames and run the worker until both are idle.
    fn settle(&mut self) {
        loop {
            let delivered = self.pump.drain_port(&self.port);
            let handled = self.worker.process_pending(&mut self.dev);
            if delivered == 0 && handled == 0 && self.port.pending() == 0 {
                break;
            }
        }
    }

    fn next_event(&mut self) -> Option<RadioEvent> {
        self.events.try_recv().ok()
    }
}

fn settings(channel: u8, address: u16) -> RadioSettings {
    RadioSettings {
        channel,
        address,
        ..RadioSettings::default()
    }
}

fn sync_config() -> SimConfig {
    SimConfig {
        append_status: true,
        sync_interrupts: true,
        ..SimConfig::default()
    }
}

#[device_test]
fn inbound_frame_lands_in_rx_fifo() {
    let link = MemoryLink::new();
    let mut node = Node::new(&link, 1, SimConfig::default(), settings(0, 1));
    assert_eq!(node.dev.state(), RadioState::Idle);

    node.dev.set_channel(5).unwrap();
    node.dev.switch_to_rx().unwrap();

    let radio = vec![7, 0, 9, 0, 0xDE, 0xAD, 0xBE, 0xEF];
    let peer = TunnelConfig {
        mac: [0x02, 0, 0, 0, 0, 9],
        source_ip: Ipv4Addr::new(10, 0, 0, 9),
        ..TunnelConfig::default()
    };
    let wire = encapsulate(&peer, 5, &radio).unwrap();
    assert_eq!(node.pump.deliver(&wire), Delivery::Accepted);

    node.settle();
    assert_eq!(node.next_event(), Some(RadioEvent::RxAvailable(8)));

    let mut out = [0u8; 8];
    node.dev.read_burst_register(FIFO, &mut out).unwrap();
    assert_eq!(out.to_vec(), radio);
    assert_eq!(node.dev.state(), RadioState::Rx);
}

#[device_test]
fn long_frame_is_sent_in_two_bursts() {
    let link = MemoryLink::new();
    let observer = link.port();
    let mut node = Node::listening(&link, 1, SimConfig::default(), settings(3, 1));

    let mut frame = vec![119, 0, 1, 0];
    frame.extend((0..116).map(|i| i as u8));
    node.handle.transmit(frame.clone()).unwrap();
    node.settle();

    assert_eq!(node.next_event(), Some(RadioEvent::TxComplete));
    node.bus.with(|chip| assert_eq!(chip.tx_bursts(), &[60, 60]));
    assert_eq!(node.worker.stats().packets_sent, 1);
    assert_eq!(node.dev.state(), RadioState::Rx);

    let wire = observer.recv().unwrap();
    let decoded = decapsulate(&wire).unwrap().unwrap();
    assert_eq!(decoded.channel, 3);
    assert_eq!(decoded.source_ip, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(decoded.radio, frame);
}

#[device_test]
fn packets_cross_between_nodes() {
    let link = MemoryLink::new();
    let mut alice = Node::listening(&link, 1, SimConfig::default(), settings(2, 1));
    let mut bob = Node::listening(&link, 2, SimConfig::default(), settings(2, 2));

    for len in [0, 29, 58] {
        let packet = Packet::new(2, 1, 0, vec![0x5A; len]).unwrap();
        alice.handle.send_packet(&packet).unwrap();
        alice.settle();
        assert_eq!(alice.next_event(), Some(RadioEvent::TxComplete));

        bob.settle();
        let Some(RadioEvent::RxAvailable(n)) = bob.next_event() else {
            panic!("no RX notification for {} byte payload", len);
        };
        assert_eq!(n, packet.to_bytes().len());
        assert_eq!(bob.dev.read_packet().unwrap(), Some(packet));
    }
}

#[device_test]
fn other_channels_and_addresses_are_not_heard() {
    let link = MemoryLink::new();
    let mut sender = Node::listening(&link, 1, SimConfig::default(), settings(4, 1));
    let mut off_channel = Node::listening(&link, 2, SimConfig::default(), settings(6, 2));
    let mut other_address = Node::listening(&link, 3, SimConfig::default(), settings(4, 3));

    let packet = Packet::new(2, 1, 0, b"hi".to_vec()).unwrap();
    sender.handle.send_packet(&packet).unwrap();
    sender.settle();

    off_channel.settle();
    other_address.settle();
    assert_eq!(off_channel.next_event(), None);
    assert_eq!(other_address.next_event(), None);
    assert_eq!(off_channel.pump.stats().ignored, 1);
    assert_eq!(other_address.pump.stats().ignored, 1);
}

#[device_test]
fn sync_interrupts_assemble_packet_with_status() {
    let link = MemoryLink::new();
    let config = SimConfig {
        rssi: 0x10,
        lqi: 0x22,
        ..sync_config()
    };
    let mut sender = Node::listening(&link, 1, SimConfig::default(), settings(1, 1));
    let mut receiver = Node::listening(&link, 2, config, settings(1, 2));

    let packet = Packet::new(0, 1, 7, b"sync mode".to_vec()).unwrap();
    sender.handle.send_packet(&packet).unwrap();
    sender.settle();
    receiver.settle();

    match receiver.next_event() {
        Some(RadioEvent::PacketReceived(rx)) => {
            assert_eq!(rx.packet, packet);
            assert_eq!(rx.rssi_raw, 0x10);
            assert_eq!(rx.lqi, 0x22);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(receiver.worker.stats().packets_received, 1);
    assert!(!receiver.worker.is_receiving_packet());
    receiver.bus.with(|chip| assert_eq!(chip.rx_fifo_len(), 0));
}

#[device_test]
fn long_frame_streams_through_rx_fifo() {
    let link = MemoryLink::new();
    let mut receiver = Node::listening(&link, 2, sync_config(), settings(0, 2));

    // 102 bytes with status: more than the FIFO holds at once.
    let mut radio = vec![99, 0, 1, 0];
    radio.extend(std::iter::repeat(0x33).take(96));
    let wire = encapsulate(&TunnelConfig::default(), 0, &radio).unwrap();
    assert_eq!(receiver.pump.deliver(&wire), Delivery::Accepted);
    receiver.settle();

    // Drained completely; the payload exceeds the packet limit.
    let stats = *receiver.worker.stats();
    assert_eq!(stats.invalid_packets, 1);
    assert_eq!(stats.resyncs, 0);
    assert!(!receiver.worker.is_receiving_packet());
    receiver.bus.with(|chip| {
        assert_eq!(chip.rx_fifo_len(), 0);
        assert_eq!(chip.stats().faults, 0);
    });
}

#[device_test]
fn power_down_and_marc_state() {
    let link = MemoryLink::new();
    let mut node = Node::listening(&link, 1, SimConfig::default(), settings(0, 1));
    assert_eq!(node.dev.get_marc_state().unwrap(), MarcState::RX);
    assert_eq!(node.dev.state(), RadioState::Rx);

    node.dev.switch_to_pwd().unwrap();
    assert_eq!(node.dev.state(), RadioState::Pwd);
    node.bus.with(|chip| {
        assert!(chip.is_sleeping());
        assert_eq!(chip.strobes().last(), Some(&Strobe::Spwd));
    });

    // Reading the state wakes the chip; the driver stays powered down.
    assert_eq!(node.dev.get_marc_state().unwrap(), MarcState::IDLE);
    assert_eq!(node.dev.state(), RadioState::Pwd);
}

#[device_test]
fn register_writes_pause_and_restore_rx() {
    let link = MemoryLink::new();
    let mut node = Node::listening(&link, 1, SimConfig::default(), settings(0, 1));
    node.dev.set_channel(7).unwrap();
    assert_eq!(node.dev.state(), RadioState::Rx);
    node.bus.with(|chip| {
        assert_eq!(chip.channel(), 7);
        assert_eq!(chip.marc_state(), MarcState::RX);
    });
}

#[device_test]
fn rx_overflow_is_flushed_by_worker() {
    let link = MemoryLink::new();
    let mut node = Node::listening(&link, 1, SimConfig::default(), settings(0, 1));
    let mut radio = vec![69, 0, 9, 0];
    radio.resize(70, 0x44);
    let wire = encapsulate(&TunnelConfig::default(), 0, &radio).unwrap();
    node.pump.deliver(&wire);
    node.settle();

    assert_eq!(node.worker.stats().resyncs, 1);
    assert_eq!(node.next_event(), None);
    node.bus.with(|chip| {
        assert_eq!(chip.marc_state(), MarcState::RX);
        assert_eq!(chip.rx_fifo_len(), 0);
    });
}

#[device_test]
#[should_panic(expected = "RX FIFO underflow")]
fn reading_empty_fifo_is_a_protocol_fault() {
    let link = MemoryLink::new();
    let mut node = Node::listening(&link, 1, SimConfig::default(), settings(0, 1));
    let mut out = [0u8; 4];
    let _ = node.dev.read_burst_register(FIFO, &mut out);
}
