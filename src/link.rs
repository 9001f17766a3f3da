//! L2: `SimpleLink`, the link layer.
//!
//! Framing, static ARP resolution, integrity filtering. Collapsed into one
//! struct since this link has exactly one listener (the network layer
//! above it) instead of a fan-out keyed by protocol type.

use log::{debug, trace, warn};
use serde_json::Value;

use crate::address::MacAddress;
use crate::errors::LinkError;
use crate::pdu::Frame;
use crate::physical::UdpSimulated;
use crate::topology::ArpTable;

pub struct SimpleLink {
    physical: UdpSimulated,
    local_mac: MacAddress,
    arp: ArpTable,
}

impl SimpleLink {
    pub fn new(physical: UdpSimulated, local_mac: MacAddress, arp: ArpTable) -> Self {
        SimpleLink {
            physical,
            local_mac,
            arp,
        }
    }

    /// Wraps `packet_map` in a `Frame` addressed via static ARP to
    /// `dst_vip`'s next hop, and sends it.
    pub fn send(&self, packet_map: Value, dst_vip: &crate::address::VirtualIpAddress) {
        let dst_mac = self.arp.next_hop(dst_vip);
        let frame = Frame::new(self.local_mac.to_string(), dst_mac.to_string(), packet_map);
        trace!("link: sending frame {} -> {}", self.local_mac, dst_mac);
        self.physical.send(dst_mac, frame.to_bytes());
    }

    /// Blocks until a valid frame addressed to this node's MAC arrives,
    /// silently dropping corrupt frames and frames addressed elsewhere
    /// and continuing to read.
    pub fn receive(&self) -> Result<Value, LinkError> {
        loop {
            let bytes = match self.physical.receive() {
                Ok(bytes) => bytes,
                Err(e) if is_read_timeout(&e) => return Err(LinkError::Timeout),
                Err(e) => return Err(LinkError::from(e)),
            };
            let (frame, integrity_ok) = Frame::from_bytes(&bytes);
            let frame = match frame {
                Some(f) => f,
                None => {
                    warn!("link: dropping undecodable datagram");
                    continue;
                }
            };
            if !integrity_ok {
                warn!("link: dropping frame with failed integrity check");
                continue;
            }
            if frame.dst_mac != self.local_mac.to_string() {
                trace!("link: dropping frame addressed to {}", frame.dst_mac);
                continue;
            }
            debug!("link: accepted frame from {}", frame.src_mac);
            return Ok(frame.data);
        }
    }
}

/// `UdpSimulated` applies a read timeout purely so a blocked `receive()`
/// can periodically recheck a cooperative shutdown flag higher up; it is
/// never a real fault and must not propagate as a `LinkError`.
fn is_read_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}
