//! Tunnel encapsulation for simulated radio frames.
//!
//! Each transmitted radio frame is wrapped as a broadcast UDP datagram
//! carrying a ZEP v1 header, inside an Ethernet frame with a private
//! ethertype:
//!
//! ```text
//! | Ethernet (14) | IPv4 (20) | UDP (8) | ZEP (16) | radio frame | pad |
//! ```
//!
//! # ZEP v1 header
//!
//! | Offset | Field                               |
//! |--------|-------------------------------------|
//! | 0..2   | preamble "EX"                       |
//! | 2      | version (1)                         |
//! | 3      | channel id                          |
//! | 4..6   | device id (radio source address)    |
//! | 6      | LQI mode (0)                        |
//! | 7      | LQI                                 |
//! | 8      | radio length byte                   |
//! | 9      | radio destination address           |
//! | 10     | radio flags                         |
//! | 11..15 | reserved                            |
//! | 15     | radio frame length                  |

use std::fmt;
use std::net::Ipv4Addr;

/// Ethertype marking tunnelled radio frames.
pub const ETHERTYPE_RADIO: u16 = 0x1234;
/// UDP destination port (ZEP).
pub const ZEP_PORT: u16 = 17754;
/// ZEP channel id used when the sender does not supply one.
pub const ZEP_DEFAULT_CHANNEL: u8 = 26;

pub const ETHER_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const ZEP_HEADER_LEN: usize = 16;
/// Minimum Ethernet payload; shorter frames are zero padded.
pub const ETHER_MIN_PAYLOAD: usize = 46;
/// Largest radio frame the ZEP length byte can describe.
pub const MAX_RADIO_FRAME: usize = u8::MAX as usize;

const ZEP_PREAMBLE: &[u8; 2] = b"EX";
const ZEP_VERSION: u8 = 1;
const IPPROTO_UDP: u8 = 17;
const IP_TTL: u8 = 255;

/// Addressing used for outgoing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TunnelConfig {
    /// Source MAC (the host interface address).
    pub mac: [u8; 6],
    pub source_ip: Ipv4Addr,
    pub broadcast_ip: Ipv4Addr,
    /// UDP destination port.
    pub port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            source_ip: Ipv4Addr::new(10, 0, 0, 1),
            broadcast_ip: Ipv4Addr::BROADCAST,
            port: ZEP_PORT,
        }
    }
}

/// Tunnel decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelError {
    /// Radio frame longer than `MAX_RADIO_FRAME`.
    FrameTooLong(usize),
    /// Buffer ends before the named layer is complete.
    Truncated(&'static str),
    NotIpv4,
    NotUdp(u8),
    BadIpChecksum,
    BadUdpChecksum,
    WrongPort(u16),
    BadPreamble,
    UnsupportedVersion(u8),
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLong(len) => {
                write!(f, "radio frame of {} bytes exceeds {}", len, MAX_RADIO_FRAME)
            }
            Self::Truncated(layer) => write!(f, "truncated {} header", layer),
            Self::NotIpv4 => write!(f, "not an IPv4 packet"),
            Self::NotUdp(proto) => write!(f, "IP protocol {} is not UDP", proto),
            Self::BadIpChecksum => write!(f, "IPv4 header checksum mismatch"),
            Self::BadUdpChecksum => write!(f, "UDP checksum mismatch"),
            Self::WrongPort(port) => write!(f, "unexpected UDP port {}", port),
            Self::BadPreamble => write!(f, "missing ZEP preamble"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported ZEP version {}", v),
        }
    }
}

impl std::error::Error for TunnelError {}

/// A decoded tunnel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelFrame {
    pub source_mac: [u8; 6],
    pub source_ip: Ipv4Addr,
    pub channel: u8,
    pub device_id: u16,
    pub lqi: u8,
    /// Radio frame, length byte first.
    pub radio: Vec<u8>,
}

/// One's-complement sum of 16-bit big-endian words, folded to 16 bits.
fn ones_complement_sum(mut acc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        acc += u16::from_be_bytes([pair[0], pair[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        acc += (*last as u32) << 8;
    }
    while acc > 0xFFFF {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    acc
}

/// Internet checksum (RFC 1071) of `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !(ones_complement_sum(0, data) as u16)
}

/// UDP checksum over the IPv4 pseudo-header and `segment` (UDP header with
/// the checksum field as sent, followed by the payload). A computed value
/// of zero is transmitted as 0xFFFF.
pub fn udp_checksum(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = IPPROTO_UDP;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());
    let sum = ones_complement_sum(ones_complement_sum(0, &pseudo), segment);
    match !(sum as u16) {
        0 => 0xFFFF,
        c => c,
    }
}

/// Wrap a radio frame for the tunnel.
pub fn encapsulate(config: &TunnelConfig, channel: u8, radio: &[u8]) -> Result<Vec<u8>, TunnelError> {
    if radio.len() > MAX_RADIO_FRAME {
        return Err(TunnelError::FrameTooLong(radio.len()));
    }

    let udp_len = UDP_HEADER_LEN + ZEP_HEADER_LEN + radio.len();
    let ip_len = IPV4_HEADER_LEN + udp_len;
    let frame_len = ETHER_HEADER_LEN + ip_len.max(ETHER_MIN_PAYLOAD);
    let mut out = vec![0u8; frame_len];

    // Ethernet
    out[0..6].copy_from_slice(&[0xFF; 6]);
    out[6..12].copy_from_slice(&config.mac);
    out[12..14].copy_from_slice(&ETHERTYPE_RADIO.to_be_bytes());

    // IPv4
    {
        let ip = &mut out[ETHER_HEADER_LEN..ETHER_HEADER_LEN + IPV4_HEADER_LEN];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(ip_len as u16).to_be_bytes());
        ip[8] = IP_TTL;
        ip[9] = IPPROTO_UDP;
        ip[12..16].copy_from_slice(&config.source_ip.octets());
        ip[16..20].copy_from_slice(&config.broadcast_ip.octets());
        let csum = internet_checksum(ip);
        ip[10..12].copy_from_slice(&csum.to_be_bytes());
    }

    // UDP + ZEP + radio
    let udp_start = ETHER_HEADER_LEN + IPV4_HEADER_LEN;
    {
        let seg = &mut out[udp_start..udp_start + udp_len];
        seg[2..4].copy_from_slice(&config.port.to_be_bytes());
        seg[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());

        let zep = &mut seg[UDP_HEADER_LEN..UDP_HEADER_LEN + ZEP_HEADER_LEN];
        zep[0..2].copy_from_slice(ZEP_PREAMBLE);
        zep[2] = ZEP_VERSION;
        zep[3] = channel;
        zep[4..6].copy_from_slice(&(radio.get(2).copied().unwrap_or(0) as u16).to_be_bytes());
        zep[8] = radio.first().copied().unwrap_or(0);
        zep[9] = radio.get(1).copied().unwrap_or(0);
        zep[10] = radio.get(3).copied().unwrap_or(0);
        zep[15] = radio.len() as u8;

        seg[UDP_HEADER_LEN + ZEP_HEADER_LEN..].copy_from_slice(radio);

        let csum = udp_checksum(config.source_ip, config.broadcast_ip, seg);
        seg[6..8].copy_from_slice(&csum.to_be_bytes());
    }

    Ok(out)
}

fn be16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

/// Unwrap a tunnel frame.
///
/// Returns `Ok(None)` for frames with a foreign ethertype; those are not
/// ours and are dropped without complaint.
pub fn decapsulate(frame: &[u8]) -> Result<Option<TunnelFrame>, TunnelError> {
    if frame.len() < ETHER_HEADER_LEN {
        return Err(TunnelError::Truncated("ethernet"));
    }
    if be16(frame, 12) != ETHERTYPE_RADIO {
        return Ok(None);
    }
    let mut source_mac = [0u8; 6];
    source_mac.copy_from_slice(&frame[6..12]);

    let ip = &frame[ETHER_HEADER_LEN..];
    if ip.len() < IPV4_HEADER_LEN {
        return Err(TunnelError::Truncated("IPv4"));
    }
    if ip[0] >> 4 != 4 {
        return Err(TunnelError::NotIpv4);
    }
    let ihl = (ip[0] & 0x0F) as usize * 4;
    let total = be16(ip, 2) as usize;
    if ihl < IPV4_HEADER_LEN || total < ihl || ip.len() < total {
        return Err(TunnelError::Truncated("IPv4"));
    }
    if internet_checksum(&ip[..ihl]) != 0 {
        return Err(TunnelError::BadIpChecksum);
    }
    if ip[9] != IPPROTO_UDP {
        return Err(TunnelError::NotUdp(ip[9]));
    }
    let src = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    let udp = &ip[ihl..total];
    if udp.len() < UDP_HEADER_LEN {
        return Err(TunnelError::Truncated("UDP"));
    }
    let udp_len = be16(udp, 4) as usize;
    if udp_len < UDP_HEADER_LEN || udp.len() < udp_len {
        return Err(TunnelError::Truncated("UDP"));
    }
    let udp = &udp[..udp_len];
    let port = be16(udp, 2);
    if port != ZEP_PORT {
        return Err(TunnelError::WrongPort(port));
    }
    if be16(udp, 6) != 0 && ones_complement_sum(pseudo_sum(src, dst, udp_len), udp) != 0xFFFF {
        return Err(TunnelError::BadUdpChecksum);
    }

    let zep = &udp[UDP_HEADER_LEN..];
    if zep.len() < ZEP_HEADER_LEN {
        return Err(TunnelError::Truncated("ZEP"));
    }
    if &zep[0..2] != ZEP_PREAMBLE {
        return Err(TunnelError::BadPreamble);
    }
    if zep[2] != ZEP_VERSION {
        return Err(TunnelError::UnsupportedVersion(zep[2]));
    }
    let data_len = zep[15] as usize;
    let data = &zep[ZEP_HEADER_LEN..];
    if data.len() < data_len {
        return Err(TunnelError::Truncated("radio"));
    }

    Ok(Some(TunnelFrame {
        source_mac,
        source_ip: src,
        channel: zep[3],
        device_id: be16(zep, 4),
        lqi: zep[7],
        radio: data[..data_len].to_vec(),
    }))
}

fn pseudo_sum(src: Ipv4Addr, dst: Ipv4Addr, udp_len: usize) -> u32 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = IPPROTO_UDP;
    pseudo[10..12].copy_from_slice(&(udp_len as u16).to_be_bytes());
    ones_complement_sum(0, &pseudo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::packet::{Packet, MAX_DATA_LENGTH};
    use cc110x_rs_macros::device_test;

    fn config() -> TunnelConfig {
        TunnelConfig {
            mac: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
            source_ip: Ipv4Addr::new(192, 168, 7, 2),
            broadcast_ip: Ipv4Addr::new(192, 168, 7, 255),
            port: ZEP_PORT,
        }
    }

    #[device_test]
    fn checksum_of_known_header() {
        // Example header from RFC 1071 discussions (checksum field zeroed)
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(internet_checksum(&header), 0xb861);
    }

    #[device_test]
    fn odd_length_checksum_pads_with_zero() {
        assert_eq!(internet_checksum(&[0x01]), !0x0100);
    }

    #[device_test]
    fn frame_layout() {
        let radio = [7u8, 0, 5, 0x40, 1, 2, 3, 4];
        let frame = encapsulate(&config(), 3, &radio).unwrap();

        assert_eq!(&frame[0..6], &[0xFF; 6]);
        assert_eq!(&frame[6..12], &config().mac);
        assert_eq!(be16(&frame, 12), ETHERTYPE_RADIO);

        let ip = &frame[ETHER_HEADER_LEN..];
        assert_eq!(ip[0], 0x45);
        assert_eq!(ip[8], 255);
        assert_eq!(internet_checksum(&ip[..IPV4_HEADER_LEN]), 0);

        let udp = &ip[IPV4_HEADER_LEN..];
        assert_eq!(be16(udp, 0), 0);
        assert_eq!(be16(udp, 2), ZEP_PORT);

        let zep = &udp[UDP_HEADER_LEN..];
        assert_eq!(&zep[0..3], b"EX\x01");
        assert_eq!(zep[3], 3);
        assert_eq!(be16(zep, 4), 5);
        assert_eq!(zep[8], 7);
        assert_eq!(zep[9], 0);
        assert_eq!(zep[10], 0x40);
        assert_eq!(zep[15], radio.len() as u8);
        assert_eq!(&zep[ZEP_HEADER_LEN..ZEP_HEADER_LEN + radio.len()], &radio);
    }

    #[device_test]
    fn short_frames_are_padded() {
        let frame = encapsulate(&config(), 0, &[]).unwrap();
        assert_eq!(frame.len(), ETHER_HEADER_LEN + ETHER_MIN_PAYLOAD);
        let decoded = decapsulate(&frame).unwrap().unwrap();
        assert!(decoded.radio.is_empty());
    }

    #[device_test]
    fn foreign_ethertype_is_ignored() {
        let mut frame = encapsulate(&config(), 0, &[3, 0, 1, 0]).unwrap();
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert_eq!(decapsulate(&frame), Ok(None));
    }

    #[device_test]
    fn corrupted_frames_are_rejected() {
        let good = encapsulate(&config(), 0, &[3, 0, 1, 0]).unwrap();

        let mut bad_ip = good.clone();
        bad_ip[ETHER_HEADER_LEN + 8] ^= 0x01;
        assert_eq!(decapsulate(&bad_ip), Err(TunnelError::BadIpChecksum));

        let mut bad_udp = good.clone();
        let last_radio = ETHER_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN + ZEP_HEADER_LEN + 3;
        bad_udp[last_radio] ^= 0xFF;
        assert_eq!(decapsulate(&bad_udp), Err(TunnelError::BadUdpChecksum));

        assert_eq!(
            decapsulate(&good[..ETHER_HEADER_LEN + 10]),
            Err(TunnelError::Truncated("IPv4"))
        );
    }

    #[device_test]
    fn oversized_radio_frame_is_rejected() {
        assert_eq!(
            encapsulate(&config(), 0, &[0u8; 256]),
            Err(TunnelError::FrameTooLong(256))
        );
    }

    #[device_test]
    fn every_packet_length_survives_the_tunnel() {
        for len in 0..=MAX_DATA_LENGTH {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let radio = Packet::new(2, 1, 0, payload).unwrap().to_bytes();
            let frame = encapsulate(&config(), 9, &radio).unwrap();
            let decoded = decapsulate(&frame)
                .unwrap()
                .unwrap_or_else(|| panic!("{} byte payload not recognised", len));
            assert_eq!(decoded.radio, radio, "payload length {}", len);
            assert_eq!(decoded.channel, 9);
        }
    }

    #[device_test]
    fn decode_carries_metadata() {
        let radio = [4u8, 9, 17, 0, 0xEE];
        let frame = encapsulate(&config(), 12, &radio).unwrap();
        let decoded = decapsulate(&frame).unwrap().unwrap();
        assert_eq!(decoded.source_mac, config().mac);
        assert_eq!(decoded.source_ip, config().source_ip);
        assert_eq!(decoded.channel, 12);
        assert_eq!(decoded.device_id, 17);
        assert_eq!(decoded.radio, radio.to_vec());
    }
}
