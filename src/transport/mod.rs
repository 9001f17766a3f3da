//! `ReliableTransport`: multiplexer over a single network endpoint.

mod connection;

pub use connection::{ConnectionKey, ReliableConnection};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, info, warn};
use rand::Rng;

use crate::address::{Port, VirtualAddress};
use crate::config::Config;
use crate::errors::{LinkError, NetworkError, TransportError};
use crate::network::HostNetwork;
use crate::pdu::Segment;
use crate::topology::NodeName;

const LOCAL_PORT_RANGE_START: u16 = 32768;
const LOCAL_PORT_RANGE_END: u16 = 61000;

struct ConnectionTable {
    connections: HashMap<ConnectionKey, Arc<ReliableConnection>>,
    used_local_ports: std::collections::HashSet<Port>,
}

/// Multiplexes one `HostNetwork` endpoint across many logical connections.
/// A background thread owns the shared mutable connection table and
/// communicates with callers through channels and locks rather than by
/// being called into directly from other threads.
pub struct ReliableTransport {
    network: Arc<HostNetwork>,
    config: Config,
    table: Arc<Mutex<ConnectionTable>>,
    accept_queue: Arc<(Mutex<VecDeque<Arc<ReliableConnection>>>, Condvar)>,
    shutdown: Arc<AtomicBool>,
    daemon: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ReliableTransport {
    /// Builds a transport over `network`. Refuses to build on a router
    /// node: routers have no transport.
    pub fn new(local: NodeName, network: HostNetwork, config: Config) -> Self {
        assert!(!local.is_router(), "a router node has no transport");
        let network = Arc::new(network);
        let table = Arc::new(Mutex::new(ConnectionTable {
            connections: HashMap::new(),
            used_local_ports: std::collections::HashSet::new(),
        }));
        let accept_queue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let daemon_network = network.clone();
        let daemon_table = table.clone();
        let daemon_accept_queue = accept_queue.clone();
        let daemon_shutdown = shutdown.clone();
        let daemon_config = config;
        let daemon = thread::spawn(move || {
            Self::daemon_loop(
                daemon_network,
                daemon_table,
                daemon_accept_queue,
                daemon_shutdown,
                daemon_config,
            );
        });

        ReliableTransport {
            network,
            config,
            table,
            accept_queue,
            shutdown,
            daemon: Mutex::new(Some(daemon)),
        }
    }

    /// Repeatedly calls `network.receive()`, building a connection key
    /// from the packet's sender and the segment's `src_port`/`dst_port`.
    /// Unmatched keys always create a new passive connection: the
    /// demultiplexer never drops a segment for being unrecognized.
    fn daemon_loop(
        network: Arc<HostNetwork>,
        table: Arc<Mutex<ConnectionTable>>,
        accept_queue: Arc<(Mutex<VecDeque<Arc<ReliableConnection>>>, Condvar)>,
        shutdown: Arc<AtomicBool>,
        config: Config,
    ) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let (src_vip, segment_map) = match network.receive() {
                Ok(v) => v,
                Err(NetworkError::Link(LinkError::Timeout)) => continue,
                Err(e) => {
                    warn!("transport daemon: network error, exiting: {}", e);
                    return;
                }
            };
            let segment = match Segment::from_map(&segment_map) {
                Some(s) => s,
                None => {
                    warn!("transport daemon: dropping undecodable segment");
                    continue;
                }
            };
            let (Some(remote_port), Some(local_port)) =
                (segment.get_u16("src_port"), segment.get_u16("dst_port"))
            else {
                warn!("transport daemon: segment missing src_port/dst_port, dropping");
                continue;
            };
            let key = ConnectionKey {
                remote_vip: src_vip,
                remote_port,
                local_port,
            };

            let existing = {
                let table = table.lock().unwrap();
                table.connections.get(&key).cloned()
            };
            if let Some(conn) = existing {
                conn.dispatch(segment);
                continue;
            }

            debug!("transport daemon: new passive connection {:?}", key);
            let conn = ReliableConnection::new(key.clone(), network.clone(), config);
            {
                let mut table = table.lock().unwrap();
                table.used_local_ports.insert(key.local_port);
                table.connections.insert(key.clone(), conn.clone());
            }
            conn.dispatch(segment);

            let (queue, condvar) = &*accept_queue;
            queue.lock().unwrap().push_back(conn);
            condvar.notify_one();
        }
    }

    /// Allocates a fresh local port and an active connection towards
    /// `remote`, registering it before any send to avoid a race with the
    /// peer's first ACK. No handshake segment is needed: the first data
    /// segment implicitly opens the connection.
    pub fn connect(&self, remote: VirtualAddress) -> Arc<ReliableConnection> {
        let mut table = self.table.lock().unwrap();
        let local_port = Self::allocate_port(&table.used_local_ports);
        table.used_local_ports.insert(local_port);
        let key = ConnectionKey {
            remote_vip: remote.vip,
            remote_port: remote.port,
            local_port,
        };
        let conn = ReliableConnection::new(key.clone(), self.network.clone(), self.config);
        table.connections.insert(key, conn.clone());
        conn
    }

    fn allocate_port(used: &std::collections::HashSet<Port>) -> Port {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(LOCAL_PORT_RANGE_START..LOCAL_PORT_RANGE_END);
            if !used.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Blocks until a new passive connection has been opened by a peer,
    /// returning connections in FIFO order.
    pub fn accept(&self) -> Result<Arc<ReliableConnection>, TransportError> {
        let (queue, condvar) = &*self.accept_queue;
        let mut queue = queue.lock().unwrap();
        loop {
            if let Some(conn) = queue.pop_front() {
                return Ok(conn);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(TransportError::ShutDown);
            }
            let (guard, timeout) = condvar
                .wait_timeout(queue, std::time::Duration::from_millis(200))
                .unwrap();
            queue = guard;
            let _ = timeout;
        }
    }

    /// Removes `key` from the connection table. Called when a connection
    /// dies from retry exhaustion so it cannot be dispatched to again.
    pub fn forget(&self, key: &ConnectionKey) {
        self.table.lock().unwrap().connections.remove(key);
    }

    /// Stops the daemon thread cooperatively and releases the network
    /// stack.
    pub fn shutdown(&self) {
        info!("transport: shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        let (_queue, condvar) = &*self.accept_queue;
        condvar.notify_all();
        if let Some(handle) = self.daemon.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReliableTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::link::SimpleLink;
    use crate::physical::UdpSimulated;
    use crate::topology::ArpTable;
    use std::net::Ipv4Addr;

    // A real send/accept/receive roundtrip needs frames to actually reach
    // their peer, which in this fixed star topology means going out
    // through the router's real bound port: see `tests/end_to_end.rs`
    // for that full multi-node scenario. This module sticks to what can
    // be tested with one arbitrarily-bound socket.

    #[test]
    #[should_panic(expected = "has no transport")]
    fn router_cannot_build_a_transport() {
        let config = Config::default();
        let physical = UdpSimulated::bind(
            Address::new(Ipv4Addr::new(127, 0, 0, 1), 19199),
            Arc::new(config),
        )
        .unwrap();
        let link = SimpleLink::new(
            physical,
            crate::topology::mac_for_vip(&NodeName::Router.vip()),
            ArpTable::for_node(NodeName::Router),
        );
        let network = HostNetwork::new(link, NodeName::Router.vip(), &config);
        let _ = ReliableTransport::new(NodeName::Router, network, config);
    }

    #[test]
    fn connect_allocates_a_port_outside_the_well_known_range() {
        let config = Config::default();
        let physical = UdpSimulated::bind(
            Address::new(Ipv4Addr::new(127, 0, 0, 1), 19200),
            Arc::new(config),
        )
        .unwrap();
        let link = SimpleLink::new(
            physical,
            crate::topology::mac_for_vip(&NodeName::Alice.vip()),
            ArpTable::for_node(NodeName::Alice),
        );
        let network = HostNetwork::new(link, NodeName::Alice.vip(), &config);
        let transport = ReliableTransport::new(NodeName::Alice, network, config);

        let remote = VirtualAddress::new(NodeName::Server.vip(), crate::topology::CHAT_SERVER_PORT);
        let conn = transport.connect(remote.clone());
        assert!(conn.key().local_port >= LOCAL_PORT_RANGE_START);
        assert!(conn.key().local_port < LOCAL_PORT_RANGE_END);
        assert_eq!(conn.key().remote_port, crate::topology::CHAT_SERVER_PORT);

        // A second connect must not collide with the first.
        let other = transport.connect(remote);
        assert_ne!(conn.key().local_port, other.key().local_port);
    }
}
