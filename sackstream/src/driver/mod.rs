//! Socket-facing driver built on tokio UDP.
//!
//! Owns sockets and timers and moves datagrams between the network and the
//! sans-io protocol types. Everything below this module is synchronous and
//! clock-free.

pub mod loss;
pub mod receiver;
pub mod sender;
pub mod sink;

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

use crate::error::Result;

/// Receive buffer size. Larger than any datagram the peer should send, so
/// payloads that grow during JSON escaping are never truncated.
pub const RECV_BUFFER: usize = 64 * 1024;

/// Bind an ephemeral socket of the right address family and connect it to
/// `peer`.
pub async fn connect(peer: SocketAddr) -> Result<UdpSocket> {
    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(peer).await?;
    Ok(socket)
}

/// An ICMP port-unreachable surfaced on a later socket call. Equivalent to a
/// lost datagram as far as the protocol is concerned.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
