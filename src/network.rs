//! L3: `HostNetwork` and `RouterNetwork`, the network layer.
//!
//! The two network variants share no code by design: a host and a router
//! play different enough roles (originate-and-receive vs. intake-and-
//! forward) that a shared base type would only add an abstraction neither
//! side fully uses.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, trace, warn};
use serde_json::Value;

use crate::address::VirtualIpAddress;
use crate::config::Config;
use crate::errors::{LinkError, NetworkError};
use crate::link::SimpleLink;
use crate::pdu::Packet;

/// Network layer for an end host: originates packets with the configured
/// initial TTL, delivers only packets addressed to the local VIP, and
/// never forwards.
pub struct HostNetwork {
    link: SimpleLink,
    local_vip: VirtualIpAddress,
    initial_ttl: u8,
}

impl HostNetwork {
    pub fn new(link: SimpleLink, local_vip: VirtualIpAddress, config: &Config) -> Self {
        HostNetwork {
            link,
            local_vip,
            initial_ttl: config.initial_ttl,
        }
    }

    pub fn local_vip(&self) -> &VirtualIpAddress {
        &self.local_vip
    }

    /// Every non-local destination is routed towards the router; there is
    /// no other next hop on an end host.
    pub fn send(&self, segment_map: Value, dst_vip: &VirtualIpAddress) -> Result<(), NetworkError> {
        let packet = Packet::new(
            self.local_vip.as_str(),
            dst_vip.as_str(),
            self.initial_ttl,
            segment_map,
        );
        trace!("host network: sending packet {} -> {}", self.local_vip, dst_vip);
        self.link.send(packet.to_map(), dst_vip);
        Ok(())
    }

    /// Blocks until a packet destined for the local VIP arrives, returning
    /// its sender's VIP alongside the carried segment map (the transport's
    /// demultiplexer needs the sender to build a connection key). Packets
    /// for any other VIP are silently dropped: hosts never forward.
    pub fn receive(&self) -> Result<(VirtualIpAddress, Value), NetworkError> {
        loop {
            let packet_map = self.link.receive().map_err(LinkError::from)?;
            let packet = match Packet::from_map(&packet_map) {
                Some(p) => p,
                None => {
                    warn!("host network: dropping undecodable packet");
                    continue;
                }
            };
            if packet.dst_vip != self.local_vip.as_str() {
                trace!("host network: dropping packet addressed to {}", packet.dst_vip);
                continue;
            }
            debug!("host network: delivering packet from {}", packet.src_vip);
            return Ok((VirtualIpAddress::new(packet.src_vip), packet.data));
        }
    }
}

/// Network layer for the router: an intake thread blocks on the link and
/// pushes every packet onto an unbounded FIFO; a separate `receive` step
/// pops one, decrements TTL, and forwards. Never delivers anything
/// upward.
pub struct RouterNetwork {
    queue: Arc<Mutex<VecDeque<Value>>>,
    link: Arc<SimpleLink>,
    _intake: thread::JoinHandle<()>,
}

impl RouterNetwork {
    pub fn new(link: SimpleLink) -> Self {
        let link = Arc::new(link);
        let queue = Arc::new(Mutex::new(VecDeque::new()));

        let intake_link = link.clone();
        let intake_queue = queue.clone();
        let intake = thread::spawn(move || {
            Self::intake_loop(intake_link, intake_queue);
        });

        RouterNetwork {
            queue,
            link,
            _intake: intake,
        }
    }

    fn intake_loop(link: Arc<SimpleLink>, queue: Arc<Mutex<VecDeque<Value>>>) {
        loop {
            match link.receive() {
                Ok(packet_map) => {
                    queue.lock().unwrap().push_back(packet_map);
                }
                Err(LinkError::Timeout) => continue,
                Err(e) => {
                    warn!("router intake: link error, thread exiting: {}", e);
                    return;
                }
            }
        }
    }

    /// Pops one queued packet, if any, and forwards it if its TTL allows.
    /// Always returns `None`: the router never surfaces packet contents
    /// upward.
    pub fn receive(&self) -> Option<()> {
        let packet_map = self.queue.lock().unwrap().pop_front()?;
        let packet = match Packet::from_map(&packet_map) {
            Some(p) => p,
            None => {
                warn!("router: dropping undecodable packet");
                return None;
            }
        };
        if packet.ttl <= 1 {
            debug!("router: dropping packet to {} (TTL expired)", packet.dst_vip);
            return None;
        }
        let dst_vip = VirtualIpAddress::new(packet.dst_vip.clone());
        let forwarded = Packet::new(packet.src_vip, packet.dst_vip, packet.ttl - 1, packet.data);
        trace!("router: forwarding packet to {} (ttl {})", dst_vip, forwarded.ttl);
        self.link.send(forwarded.to_map(), &dst_vip);
        None
    }
}

/// Spawns a thread that repeatedly calls `RouterNetwork::receive`, giving
/// the router a background forwarding loop analogous to a host's
/// transport daemon. Kept separate from `RouterNetwork::new`'s intake
/// thread so intake (blocking I/O) and forwarding policy stay isolated.
pub fn spawn_forwarding_loop(router: Arc<RouterNetwork>) -> (thread::JoinHandle<()>, Sender<()>) {
    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = mpsc::channel();
    let handle = thread::spawn(move || loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        router.receive();
        thread::sleep(std::time::Duration::from_millis(1));
    });
    (handle, stop_tx)
}
