//! L1: `UdpSimulated`, the physical layer.
//!
//! Owns one bound datagram socket and hands bytes to the noisy substrate.
//! A blocking receive primitive wrapped by a tiny struct, no protocol
//! logic here at all.

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::address::{Address, MacAddress};
use crate::config::Config;
use crate::substrate;
use crate::topology;

/// Socket reads time out at this interval so a blocked `receive()` can
/// periodically give its caller (the link layer) a chance to notice a
/// cooperative shutdown request instead of blocking forever: shutting
/// down the transport must wake every blocked receive/accept caller.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The lowest layer: one bound socket per node, sending through the noisy
/// substrate and blocking on receive.
pub struct UdpSimulated {
    socket: UdpSocket,
    config: Arc<Config>,
}

impl UdpSimulated {
    /// Binds to `local`. Two processes binding the same node
    /// simultaneously is an OS-level error, surfaced here unchanged.
    pub fn bind(local: Address, config: Arc<Config>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(std::net::SocketAddr::from(local))?;
        socket.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        debug!("UdpSimulated bound to {}", local);
        Ok(UdpSimulated { socket, config })
    }

    /// Resolves `dst_mac` to a real (IP, port) via the topology table and
    /// hands `frame_bytes` to the noisy substrate send function.
    ///
    /// # Panics
    ///
    /// Panics if `dst_mac` is not one of the fixed topology MACs: an
    /// unknown MAC is a programming error here, not something to recover
    /// from.
    pub fn send(&self, dst_mac: MacAddress, frame_bytes: Vec<u8>) {
        let dst = topology::resolve_mac(dst_mac);
        substrate::send_noisy(&self.socket, dst, frame_bytes, &self.config);
    }

    /// Blocking read of a single datagram. Returns
    /// `io::ErrorKind::WouldBlock`/`TimedOut` every `READ_POLL_INTERVAL`
    /// with no data available; callers that want a truly blocking read
    /// should retry on those kinds.
    pub fn receive(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 64 * 1024];
        let (n, _from) = self.socket.recv_from(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn close(self) {
        // Dropping `self.socket` releases the underlying file descriptor.
        drop(self);
    }
}
