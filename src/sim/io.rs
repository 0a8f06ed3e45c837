//! Frame transport between simulated chips and the outside world.
//!
//! Outbound: the chip hands each encapsulated frame to a [`FrameSink`]
//! (the TAP writer, or a [`MemoryPort`] in tests). Inbound: a
//! [`TunnelPump`] decapsulates raw Ethernet frames and offers them to the
//! chip's receiver.

use super::chip::SimulatedChip;
use super::tunnel::{decapsulate, TunnelError};
use crate::radio::bus::SharedBus;
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination for encapsulated outbound frames.
pub trait FrameSink {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

type Inboxes = Vec<VecDeque<Vec<u8>>>;

/// In-process broadcast medium. Every frame sent on one port is queued
/// on all other ports.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    medium: Arc<Mutex<Inboxes>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new port.
    pub fn port(&self) -> MemoryPort {
        let mut medium = lock(&self.medium);
        medium.push(VecDeque::new());
        MemoryPort {
            id: medium.len() - 1,
            medium: Arc::clone(&self.medium),
        }
    }
}

fn lock(medium: &Mutex<Inboxes>) -> MutexGuard<'_, Inboxes> {
    medium.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One endpoint of a [`MemoryLink`].
#[derive(Debug, Clone)]
pub struct MemoryPort {
    id: usize,
    medium: Arc<Mutex<Inboxes>>,
}

impl MemoryPort {
    /// Oldest frame queued for this port.
    pub fn recv(&self) -> Option<Vec<u8>> {
        lock(&self.medium)[self.id].pop_front()
    }

    /// Number of frames waiting.
    pub fn pending(&self) -> usize {
        lock(&self.medium)[self.id].len()
    }
}

impl FrameSink for MemoryPort {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut medium = lock(&self.medium);
        for (id, inbox) in medium.iter_mut().enumerate() {
            if id != self.id {
                inbox.push_back(frame.to_vec());
            }
        }
        Ok(())
    }
}

/// Result of offering one raw frame to the chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Loaded into the receiver.
    Accepted,
    /// Not a tunnel frame (other ethertype).
    Foreign,
    /// A tunnel frame the receiver ignored (channel, state, address).
    Ignored,
    Malformed(TunnelError),
}

/// Inbound pump counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub accepted: u32,
    pub foreign: u32,
    pub ignored: u32,
    pub malformed: u32,
}

/// Decapsulates raw frames and hands them to a simulated chip.
#[derive(Clone)]
pub struct TunnelPump {
    bus: SharedBus<SimulatedChip>,
    stats: PumpStats,
}

impl TunnelPump {
    pub fn new(bus: SharedBus<SimulatedChip>) -> Self {
        Self {
            bus,
            stats: PumpStats::default(),
        }
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Offer one raw Ethernet frame to the chip.
    pub fn deliver(&mut self, raw: &[u8]) -> Delivery {
        let outcome = match decapsulate(raw) {
            Ok(None) => {
                trace!("pump: foreign frame ({} bytes)", raw.len());
                Delivery::Foreign
            }
            Ok(Some(frame)) => {
                if self.bus.with(|chip| chip.receive(&frame)) {
                    Delivery::Accepted
                } else {
                    Delivery::Ignored
                }
            }
            Err(e) => {
                warn!("pump: dropping malformed tunnel frame: {}", e);
                Delivery::Malformed(e)
            }
        };
        match outcome {
            Delivery::Accepted => self.stats.accepted += 1,
            Delivery::Foreign => self.stats.foreign += 1,
            Delivery::Ignored => self.stats.ignored += 1,
            Delivery::Malformed(_) => self.stats.malformed += 1,
        }
        outcome
    }

    /// Deliver every frame queued on `port`. Returns how many the chip
    /// accepted.
    pub fn drain_port(&mut self, port: &MemoryPort) -> usize {
        let mut accepted = 0;
        while let Some(raw) = port.recv() {
            if self.deliver(&raw) == Delivery::Accepted {
                accepted += 1;
            }
        }
        if accepted > 0 {
            debug!("pump: {} frames accepted", accepted);
        }
        accepted
    }
}
