//! UDP endpoints for discovery and control.
//!
//! Three roles, three constructors: the multicast listener that receives scan
//! responses, the multicast sender that emits scan requests, and the unicast
//! control socket used for commands and status queries. Sockets are built with
//! `socket2` so the options can be set before binding, then handed to the
//! selected async runtime.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::errors::Error;
use crate::runtime::{AsyncUdpSocket, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// Multicast group devices listen on for scan requests.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// Device-side port for scan requests.
pub const SCAN_PORT: u16 = 4001;
/// Local port scan responses are sent to.
pub const LISTEN_PORT: u16 = 4002;
/// Device-side port for control and status commands.
pub const CONTROL_PORT: u16 = 4003;

/// Largest datagram the receive paths accept.
pub(crate) const RECV_BUFFER: usize = 8192;

/// A unicast socket with the receive timeout it was configured with.
pub struct ControlSocket {
    socket: UdpSocket,
    // Same socket, read directly when flushing stale replies.
    raw: std::net::UdpSocket,
    timeout: Duration,
}

impl ControlSocket {
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    /// Drop every datagram already queued on the socket.
    ///
    /// Returns how many were discarded. Reads never block.
    pub fn discard_pending(&self) -> usize {
        let mut buffer = [0u8; RECV_BUFFER];
        let mut discarded = 0;
        loop {
            match self.raw.recv_from(&mut buffer) {
                Ok((_, from)) => {
                    debug!("discarding stale datagram from {from}");
                    discarded += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("failed to flush control socket: {e}");
                    break;
                }
            }
        }
        discarded
    }

    /// Idle-receive timeout for one exchange.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::socket("local_addr", e))
    }
}

/// Socket bound to the scan-response port and joined to the multicast group.
///
/// With `bind_ip` the socket binds and joins on that interface only.
pub fn listener_socket(bind_ip: Option<Ipv4Addr>) -> Result<UdpSocket> {
    let iface = bind_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let socket = new_socket()?;

    socket
        .bind(&SocketAddrV4::new(iface, LISTEN_PORT).into())
        .map_err(|e| Error::socket("bind", e))?;
    socket
        .join_multicast_v4(&MULTICAST_GROUP, &iface)
        .map_err(|e| Error::socket("join_multicast", e))?;

    debug!("listening on {iface}:{LISTEN_PORT}, joined {MULTICAST_GROUP}");
    into_async(socket)
}

/// Socket for sending scan requests to the multicast group.
///
/// TTL is 1 so requests never leave the local segment. `bind_ip` pins the
/// egress interface on multi-homed hosts.
pub fn multicast_sender_socket(bind_ip: Option<Ipv4Addr>) -> Result<UdpSocket> {
    let socket = new_socket()?;

    let iface = bind_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
    socket
        .bind(&SocketAddrV4::new(iface, 0).into())
        .map_err(|e| Error::socket("bind", e))?;
    if let Some(ip) = bind_ip {
        socket
            .set_multicast_if_v4(&ip)
            .map_err(|e| Error::socket("set_multicast_if", e))?;
    }
    socket
        .set_multicast_ttl_v4(1)
        .map_err(|e| Error::socket("set_multicast_ttl", e))?;

    into_async(socket)
}

/// Unicast socket for control commands and status queries.
///
/// `local_port` pins the local port when replies must arrive on a specific
/// port; otherwise an ephemeral port is used.
pub fn control_socket(
    bind_ip: Option<Ipv4Addr>,
    local_port: Option<u16>,
    timeout: Duration,
) -> Result<ControlSocket> {
    let socket = new_socket()?;
    let addr = SocketAddrV4::new(
        bind_ip.unwrap_or(Ipv4Addr::UNSPECIFIED),
        local_port.unwrap_or(0),
    );
    socket
        .bind(&addr.into())
        .map_err(|e| Error::socket("bind", e))?;

    let raw = socket
        .try_clone()
        .map_err(|e| Error::socket("try_clone", e))?
        .into();
    Ok(ControlSocket {
        socket: into_async(socket)?,
        raw,
        timeout,
    })
}

fn new_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::socket("create", e))?;

    // Tolerate rapid successive runs on the same host.
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::socket("set_reuse_address", e))?;
    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!("Failed to set SO_REUSEPORT: {e}");
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| Error::socket("set_nonblocking", e))?;
    Ok(socket)
}

fn into_async(socket: Socket) -> Result<UdpSocket> {
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(|e| Error::socket("register", e))
}
