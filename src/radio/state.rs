//! Driver-visible radio state machine.
//!
//! The driver tracks its own view of the transceiver state. It is moved only
//! through [`RadioState::next`], which rejects transitions that make no sense
//! from the current state.
//!
//! ```text
//!             Reset                EnterRx
//!  Unknown ──────────▶ Idle ◀──────────────▶ Rx ──RxStart──▶ RxBusy
//!                       │  WakeFromRx        ▲ ◀────RxDone────┘
//!                       │                    │
//!                       ├──PowerDown──▶ Pwd  │
//!                       └──TxStart──▶ TxBusy ┘ TxDone { resume_rx }
//! ```

use std::fmt;

/// Radio state as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioState {
    /// Not yet reset.
    #[default]
    Unknown,
    /// Idle, crystal running.
    Idle,
    /// Listening.
    Rx,
    /// Powered down.
    Pwd,
    /// Transmission in progress.
    TxBusy,
    /// Packet reception in progress.
    RxBusy,
}

/// Event that moves the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Power-up reset sequence completed.
    Reset,
    /// Receiver enabled.
    EnterRx,
    /// Receiver stopped (no effect unless receiving).
    WakeFromRx,
    /// Power-down strobe issued.
    PowerDown,
    /// Transmission started.
    TxStart,
    /// Transmission finished, return to RX or IDLE.
    TxDone { resume_rx: bool },
    /// Sync word seen, packet assembly started.
    RxStart,
    /// Packet assembly finished or abandoned.
    RxDone,
}

/// A transition that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: RadioState,
    pub event: Transition,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {:?} from state {}", self.event, self.from)
    }
}

impl std::error::Error for IllegalTransition {}

impl RadioState {
    /// State after `event`, or an error if `event` is not legal here.
    pub fn next(self, event: Transition) -> Result<RadioState, IllegalTransition> {
        use RadioState::*;
        let illegal = Err(IllegalTransition { from: self, event });
        match event {
            Transition::Reset => Ok(Idle),
            Transition::EnterRx => match self {
                Unknown => illegal,
                _ => Ok(Rx),
            },
            Transition::WakeFromRx => Ok(if self.is_receiving() { Idle } else { self }),
            Transition::PowerDown => match self {
                Unknown => illegal,
                _ => Ok(Pwd),
            },
            Transition::TxStart => match self {
                Unknown | TxBusy => illegal,
                _ => Ok(TxBusy),
            },
            Transition::TxDone { resume_rx } => match self {
                TxBusy if resume_rx => Ok(Rx),
                TxBusy => Ok(Idle),
                _ => illegal,
            },
            Transition::RxStart => match self {
                Rx => Ok(RxBusy),
                _ => illegal,
            },
            Transition::RxDone => match self {
                RxBusy => Ok(Rx),
                _ => illegal,
            },
        }
    }

    /// True when the receiver is running (state must be restored after a
    /// register access).
    pub fn is_receiving(self) -> bool {
        matches!(self, Self::Rx | Self::RxBusy)
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Idle => "IDLE",
            Self::Rx => "RX",
            Self::Pwd => "PWD",
            Self::TxBusy => "TX BUSY",
            Self::RxBusy => "RX BUSY",
        }
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Power mode request for [`crate::radio::Cc110x::set_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Receiver on.
    On,
    /// Powered down.
    Off,
    /// Query only.
    Get,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc110x_rs_macros::device_test;

    #[device_test]
    fn reset_always_reaches_idle() {
        for state in [
            RadioState::Unknown,
            RadioState::Rx,
            RadioState::Pwd,
            RadioState::TxBusy,
        ] {
            assert_eq!(state.next(Transition::Reset), Ok(RadioState::Idle));
        }
    }

    #[device_test]
    fn unknown_rejects_everything_but_reset() {
        let s = RadioState::Unknown;
        assert!(s.next(Transition::EnterRx).is_err());
        assert!(s.next(Transition::TxStart).is_err());
        assert!(s.next(Transition::PowerDown).is_err());
        assert_eq!(s.next(Transition::WakeFromRx), Ok(RadioState::Unknown));
    }

    #[device_test]
    fn wake_only_affects_receiving_states() {
        assert_eq!(
            RadioState::Rx.next(Transition::WakeFromRx),
            Ok(RadioState::Idle)
        );
        assert_eq!(
            RadioState::Pwd.next(Transition::WakeFromRx),
            Ok(RadioState::Pwd)
        );
        assert_eq!(
            RadioState::Idle.next(Transition::WakeFromRx),
            Ok(RadioState::Idle)
        );
    }

    #[device_test]
    fn tx_cycle_restores_previous_mode() {
        let busy = RadioState::Rx.next(Transition::TxStart).unwrap();
        assert_eq!(busy, RadioState::TxBusy);
        assert!(busy.next(Transition::TxStart).is_err());
        assert_eq!(
            busy.next(Transition::TxDone { resume_rx: true }),
            Ok(RadioState::Rx)
        );
        assert_eq!(
            busy.next(Transition::TxDone { resume_rx: false }),
            Ok(RadioState::Idle)
        );
        assert!(RadioState::Idle
            .next(Transition::TxDone { resume_rx: true })
            .is_err());
    }

    #[device_test]
    fn rx_assembly_cycle() {
        assert!(RadioState::Idle.next(Transition::RxStart).is_err());
        let busy = RadioState::Rx.next(Transition::RxStart).unwrap();
        assert_eq!(busy, RadioState::RxBusy);
        assert_eq!(busy.next(Transition::RxDone), Ok(RadioState::Rx));
    }

    #[device_test]
    fn power_down_from_any_initialized_state() {
        for state in [RadioState::Idle, RadioState::Rx, RadioState::Pwd] {
            assert_eq!(state.next(Transition::PowerDown), Ok(RadioState::Pwd));
        }
    }

    #[device_test]
    fn state_names() {
        assert_eq!(RadioState::Rx.to_string(), "RX");
        assert_eq!(RadioState::Pwd.to_string(), "PWD");
        assert_eq!(RadioState::Unknown.to_string(), "Unknown");
        assert_eq!(RadioState::RxBusy.to_string(), "RX BUSY");
        assert_eq!(RadioState::TxBusy.to_string(), "TX BUSY");
    }

    #[device_test]
    fn only_rx_states_count_as_receiving() {
        let receiving: Vec<_> = [
            RadioState::Unknown,
            RadioState::Idle,
            RadioState::Rx,
            RadioState::RxBusy,
            RadioState::TxBusy,
            RadioState::Pwd,
        ]
        .into_iter()
        .filter(|s| s.is_receiving())
        .collect();
        assert_eq!(receiving, [RadioState::Rx, RadioState::RxBusy]);
    }
}
