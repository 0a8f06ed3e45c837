//! Radio packet layout.
//!
//! On air (and in the FIFO) a packet is:
//!
//! | Byte | Field                                  |
//! |------|----------------------------------------|
//! | 0    | length (bytes following this one)      |
//! | 1    | destination address (0 = broadcast)    |
//! | 2    | source address                         |
//! | 3    | flags                                  |
//! | 4..  | payload                                |
//!
//! With status appending enabled the chip adds RSSI and LQI/CRC bytes after
//! the last payload byte when receiving.

use super::regs::{BROADCAST_ADDRESS, CRC_OK, LQI_EST, STATUS_BYTES};
use std::fmt;

/// Bytes counted by the length field that are not payload (dst, src, flags).
pub const HEADER_LENGTH: usize = 3;

/// Largest payload that fits a single FIFO load with the length byte.
pub const MAX_DATA_LENGTH: usize = 58;

/// Packet construction / parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Payload exceeds `MAX_DATA_LENGTH`.
    PayloadTooLong(usize),
    /// Length byte smaller than the header.
    LengthTooShort(u8),
    /// Buffer shorter than the length byte claims.
    Truncated { expected: usize, actual: usize },
    /// Empty buffer.
    Empty,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLong(len) => write!(
                f,
                "payload of {} bytes exceeds maximum of {}",
                len, MAX_DATA_LENGTH
            ),
            Self::LengthTooShort(len) => {
                write!(f, "length byte {} is shorter than the packet header", len)
            }
            Self::Truncated { expected, actual } => {
                write!(f, "packet truncated: expected {} bytes, got {}", expected, actual)
            }
            Self::Empty => write!(f, "empty packet"),
        }
    }
}

impl std::error::Error for PacketError {}

/// A radio packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dest: u8,
    pub src: u8,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, rejecting payloads above `MAX_DATA_LENGTH`.
    pub fn new(dest: u8, src: u8, flags: u8, payload: impl Into<Vec<u8>>) -> Result<Self, PacketError> {
        let payload = payload.into();
        if payload.len() > MAX_DATA_LENGTH {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }
        Ok(Self {
            dest,
            src,
            flags,
            payload,
        })
    }

    /// Value of the length byte.
    pub fn length(&self) -> u8 {
        (HEADER_LENGTH + self.payload.len()) as u8
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest == BROADCAST_ADDRESS
    }

    /// Serialize including the length byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + HEADER_LENGTH + self.payload.len());
        out.push(self.length());
        out.push(self.dest);
        out.push(self.src);
        out.push(self.flags);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a frame starting at the length byte. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let (&length, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
        let length_usize = length as usize;
        if length_usize < HEADER_LENGTH {
            return Err(PacketError::LengthTooShort(length));
        }
        if rest.len() < length_usize {
            return Err(PacketError::Truncated {
                expected: length_usize + 1,
                actual: bytes.len(),
            });
        }
        let payload = &rest[HEADER_LENGTH..length_usize];
        Packet::new(rest[0], rest[1], rest[2], payload)
    }
}

/// A packet plus the link metrics appended by the chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub packet: Packet,
    /// Raw RSSI register value (two's complement, 0.5 dB steps).
    pub rssi_raw: u8,
    /// Link quality indicator.
    pub lqi: u8,
}

impl ReceivedPacket {
    /// RSSI in dBm using the datasheet offset of 74 dB.
    pub fn rssi_dbm(&self) -> i16 {
        (self.rssi_raw as i8) as i16 / 2 - 74
    }
}

/// Status bytes appended after a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendedStatus {
    pub rssi_raw: u8,
    pub lqi: u8,
    pub crc_ok: bool,
}

impl AppendedStatus {
    /// Split the trailing status bytes off a received frame.
    pub fn split(frame: &[u8]) -> Option<(&[u8], Self)> {
        if frame.len() < STATUS_BYTES {
            return None;
        }
        let (body, status) = frame.split_at(frame.len() - STATUS_BYTES);
        Some((
            body,
            Self {
                rssi_raw: status[0],
                lqi: status[1] & LQI_EST,
                crc_ok: status[1] & CRC_OK != 0,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc110x_rs_macros::device_test;

    #[device_test]
    fn length_counts_header_and_payload() {
        let packet = Packet::new(0, 7, 0, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(packet.length(), 7);
        assert_eq!(packet.to_bytes(), vec![7, 0, 7, 0, 1, 2, 3, 4]);
        assert!(packet.is_broadcast());
    }

    #[device_test]
    fn payload_limit_enforced() {
        assert!(Packet::new(1, 2, 0, vec![0; MAX_DATA_LENGTH]).is_ok());
        assert_eq!(
            Packet::new(1, 2, 0, vec![0; MAX_DATA_LENGTH + 1]),
            Err(PacketError::PayloadTooLong(MAX_DATA_LENGTH + 1))
        );
    }

    #[device_test]
    fn parse_rejects_bad_frames() {
        assert_eq!(Packet::from_bytes(&[]), Err(PacketError::Empty));
        assert_eq!(
            Packet::from_bytes(&[2, 1, 1]),
            Err(PacketError::LengthTooShort(2))
        );
        assert_eq!(
            Packet::from_bytes(&[5, 1, 2, 0]),
            Err(PacketError::Truncated {
                expected: 6,
                actual: 4
            })
        );
    }

    #[device_test]
    fn parse_ignores_trailing_status() {
        let bytes = [4, 9, 3, 0x10, 0xAA, 0x50, 0x95];
        let packet = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(packet.dest, 9);
        assert_eq!(packet.src, 3);
        assert_eq!(packet.flags, 0x10);
        assert_eq!(packet.payload, vec![0xAA]);
    }

    #[device_test]
    fn appended_status_split() {
        let frame = [4, 9, 3, 0, 0xAA, 0x20, 0x95];
        let (body, status) = AppendedStatus::split(&frame).unwrap();
        assert_eq!(body, &frame[..5]);
        assert_eq!(status.rssi_raw, 0x20);
        assert_eq!(status.lqi, 0x15);
        assert!(status.crc_ok);

        let (_, bad) = AppendedStatus::split(&[3, 1, 2, 0, 0x20, 0x15]).unwrap();
        assert!(!bad.crc_ok);
    }

    #[device_test]
    fn rssi_conversion() {
        let rx = ReceivedPacket {
            packet: Packet::new(0, 1, 0, vec![]).unwrap(),
            rssi_raw: 0x20,
            lqi: 0,
        };
        assert_eq!(rx.rssi_dbm(), 16 - 74);
    }
}
