//! Linux TAP backend for the simulator.
//!
//! Opens `/dev/net/tun` in TAP mode without packet info, reads the
//! interface MAC, IPv4 and broadcast addresses for the tunnel header, and
//! runs a non-blocking read loop that feeds a [`TunnelPump`].

use super::io::{FrameSink, PumpStats, TunnelPump};
use super::tunnel::{TunnelConfig, ZEP_PORT};
use log::{debug, info, warn};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, UdpSocket};
use std::os::fd::AsRawFd;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio_util::sync::CancellationToken;

const CLONE_DEVICE: &str = "/dev/net/tun";
const TUNSETIFF: u64 = 0x4004_54ca;
const IFF_TAP: i16 = 0x0002;
const IFF_NO_PI: i16 = 0x1000;
/// Largest Ethernet frame read from the interface.
pub const TAP_MTU: usize = 1518;

/// `struct ifreq`: interface name followed by a 24-byte union.
#[repr(C)]
struct IfReq {
    name: [u8; libc::IFNAMSIZ],
    data: [u8; 24],
}

impl IfReq {
    fn new(name: &str) -> Result<Self, TapError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ || bytes.contains(&0) {
            return Err(TapError::InvalidName(name.to_string()));
        }
        let mut req = Self {
            name: [0; libc::IFNAMSIZ],
            data: [0; 24],
        };
        req.name[..bytes.len()].copy_from_slice(bytes);
        Ok(req)
    }

    /// IPv4 address of a `sockaddr_in` stored in the union.
    fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[4], self.data[5], self.data[6], self.data[7])
    }
}

fn ioctl(fd: i32, request: u64, name: &'static str, req: &mut IfReq) -> Result<(), TapError> {
    // SAFETY: `req` is a live, correctly sized `struct ifreq` for the
    // duration of the call.
    let rc = unsafe { libc::ioctl(fd, request as _, req as *mut IfReq) };
    if rc == -1 {
        return Err(TapError::Ioctl {
            request: name,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// TAP setup or I/O failure.
#[derive(Debug)]
pub enum TapError {
    InvalidName(String),
    Open(io::Error),
    Ioctl {
        request: &'static str,
        source: io::Error,
    },
    Io(io::Error),
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid interface name {:?}", name),
            Self::Open(e) => write!(f, "cannot open {}: {}", CLONE_DEVICE, e),
            Self::Ioctl { request, source } => write!(f, "ioctl {} failed: {}", request, source),
            Self::Io(e) => write!(f, "tap I/O error: {}", e),
        }
    }
}

impl std::error::Error for TapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(_) => None,
            Self::Open(e) | Self::Io(e) => Some(e),
            Self::Ioctl { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for TapError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// An attached TAP interface.
pub struct TapDevice {
    name: String,
    file: File,
    tunnel: TunnelConfig,
}

impl TapDevice {
    /// Attach to (or create) TAP interface `name`.
    pub fn open(name: &str) -> Result<Self, TapError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(CLONE_DEVICE)
            .map_err(TapError::Open)?;
        let fd = file.as_raw_fd();

        let mut req = IfReq::new(name)?;
        req.data[..2].copy_from_slice(&(IFF_TAP | IFF_NO_PI).to_ne_bytes());
        ioctl(fd, TUNSETIFF, "TUNSETIFF", &mut req)?;

        let mut req = IfReq::new(name)?;
        ioctl(fd, libc::SIOCGIFHWADDR as u64, "SIOCGIFHWADDR", &mut req)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&req.data[2..8]);

        let defaults = TunnelConfig::default();
        let (source_ip, broadcast_ip) = match Self::ipv4_addresses(name) {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("tap {}: no IPv4 configuration ({}), using defaults", name, e);
                (defaults.source_ip, defaults.broadcast_ip)
            }
        };

        set_nonblocking(fd)?;

        let tunnel = TunnelConfig {
            mac,
            source_ip,
            broadcast_ip,
            port: ZEP_PORT,
        };
        info!(
            "tap {}: mac {:02x?}, ip {}, broadcast {}",
            name, mac, source_ip, broadcast_ip
        );
        Ok(Self {
            name: name.to_string(),
            file,
            tunnel,
        })
    }

    fn ipv4_addresses(name: &str) -> Result<(Ipv4Addr, Ipv4Addr), TapError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        let fd = socket.as_raw_fd();
        let mut req = IfReq::new(name)?;
        ioctl(fd, libc::SIOCGIFADDR as u64, "SIOCGIFADDR", &mut req)?;
        let ip = req.ipv4();
        let mut req = IfReq::new(name)?;
        ioctl(fd, libc::SIOCGIFBRDADDR as u64, "SIOCGIFBRDADDR", &mut req)?;
        Ok((ip, req.ipv4()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Addressing for frames this node sends.
    pub fn tunnel_config(&self) -> TunnelConfig {
        self.tunnel
    }

    /// A [`FrameSink`] that writes to this interface.
    pub fn writer(&self) -> Result<TapWriter, TapError> {
        Ok(TapWriter {
            file: self.file.try_clone()?,
        })
    }

    /// Feed every inbound frame to `pump` until `cancel` fires.
    pub async fn run(self, mut pump: TunnelPump, cancel: CancellationToken) -> Result<PumpStats, TapError> {
        let name = self.name;
        let fd = AsyncFd::with_interest(self.file, Interest::READABLE)?;
        let mut buf = vec![0u8; TAP_MTU];
        info!("tap {}: reading", name);

        loop {
            let mut guard = tokio::select! {
                _ = cancel.cancelled() => break,
                ready = fd.readable() => ready?,
            };
            match guard.try_io(|inner| (&*inner.get_ref()).read(&mut buf)) {
                Ok(Ok(0)) => {
                    warn!("tap {}: end of file", name);
                    break;
                }
                Ok(Ok(n)) => {
                    let outcome = pump.deliver(&buf[..n]);
                    debug!("tap {}: {} bytes -> {:?}", name, n, outcome);
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_would_block) => {}
            }
        }

        info!("tap {}: stopped ({:?})", name, pump.stats());
        Ok(pump.stats())
    }
}

fn set_nonblocking(fd: i32) -> Result<(), TapError> {
    // SAFETY: plain fcntl calls on a descriptor we own.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(TapError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Write half of a [`TapDevice`].
pub struct TapWriter {
    file: File,
}

impl FrameSink for TapWriter {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.file.write(frame) {
            Ok(n) if n == frame.len() => Ok(()),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short tap write ({} of {} bytes)", n, frame.len()),
            )),
            Err(e) => Err(e),
        }
    }
}
