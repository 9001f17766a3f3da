//! `ReliableConnection`: Stop-and-Wait per peer-pair.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use base64::Engine;
use log::{debug, trace, warn};
use serde_json::Value;

use crate::address::{Port, VirtualIpAddress};
use crate::config::Config;
use crate::errors::TransportError;
use crate::network::HostNetwork;
use crate::pdu::Segment;

/// Identifies exactly one logical bi-directional connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub remote_vip: VirtualIpAddress,
    pub remote_port: Port,
    pub local_port: Port,
}

struct ConnState {
    send_seq: u8,
    recv_seq: u8,
    closed: bool,
    fin_received: bool,
}

/// One Stop-and-Wait connection. Holds a non-owning `Arc<HostNetwork>`
/// handle to emit packets rather than a back-reference to the owning
/// `ReliableTransport`, avoiding an ownership cycle.
pub struct ReliableConnection {
    key: ConnectionKey,
    network: Arc<HostNetwork>,
    config: Config,
    state: Mutex<ConnState>,
    ack_tx: Sender<Segment>,
    ack_rx: Mutex<Receiver<Segment>>,
    data_tx: Sender<Segment>,
    data_rx: Mutex<Receiver<Segment>>,
}

impl ReliableConnection {
    pub fn new(key: ConnectionKey, network: Arc<HostNetwork>, config: Config) -> Arc<Self> {
        let (ack_tx, ack_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();
        Arc::new(ReliableConnection {
            key,
            network,
            config,
            state: Mutex::new(ConnState {
                send_seq: 0,
                recv_seq: 0,
                closed: false,
                fin_received: false,
            }),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
            data_tx,
            data_rx: Mutex::new(data_rx),
        })
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn fin_received(&self) -> bool {
        self.state.lock().unwrap().fin_received
    }

    /// Called on the demultiplexer's thread: classifies `segment` as ACK
    /// vs DATA/FIN and routes it to the matching internal queue. Never
    /// blocks.
    pub fn dispatch(&self, segment: Segment) {
        if segment.is_ack {
            trace!("conn {:?}: queued ack seq {}", self.key, segment.seq_num);
            let _ = self.ack_tx.send(segment);
        } else {
            trace!("conn {:?}: queued data/fin seq {}", self.key, segment.seq_num);
            let _ = self.data_tx.send(segment);
        }
    }

    fn emit(&self, segment: &Segment) {
        let mut segment = segment.clone();
        segment
            .payload
            .insert("src_port".to_owned(), Value::from(self.key.local_port));
        segment
            .payload
            .insert("dst_port".to_owned(), Value::from(self.key.remote_port));
        let _ = self.network.send(segment.to_map(), &self.key.remote_vip);
    }

    fn emit_ack(&self, seq_num: u8) {
        self.emit(&Segment::new(seq_num, true));
    }

    /// Sends `message_bytes` over the connection, partitioned into
    /// `Config::mss`-sized chunks, retransmitting an unacknowledged chunk
    /// until it is ACKed or the retry ceiling is reached.
    pub fn send(&self, message_bytes: &[u8]) -> Result<(), TransportError> {
        let chunks: Vec<&[u8]> = if message_bytes.is_empty() {
            vec![&message_bytes[0..0]]
        } else {
            message_bytes.chunks(self.config.mss).collect()
        };
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let more = i != last;
            let seq = {
                let state = self.state.lock().unwrap();
                state.send_seq
            };
            let encoded = base64::engine::general_purpose::STANDARD.encode(chunk);
            let segment = Segment::new(seq, false)
                .with("data", Value::String(encoded))
                .with("more", Value::Bool(more));
            self.send_until_acked(segment, seq)?;
            let mut state = self.state.lock().unwrap();
            state.send_seq ^= 1;
        }
        Ok(())
    }

    /// Core of Stop-and-Wait: emit `segment`, then wait for a matching ACK
    /// with a bounded timeout, retransmitting on timeout up to
    /// `Config::retry_ceiling`.
    fn send_until_acked(&self, segment: Segment, expected_seq: u8) -> Result<(), TransportError> {
        let ack_rx = self.ack_rx.lock().unwrap();
        for attempt in 0..self.config.retry_ceiling {
            self.emit(&segment);
            match ack_rx.recv_timeout(self.config.ack_timeout) {
                Ok(ack) if ack.seq_num == expected_seq => return Ok(()),
                Ok(ack) => {
                    trace!(
                        "conn {:?}: discarding ack for obsolete seq {}",
                        self.key,
                        ack.seq_num
                    );
                }
                Err(_timeout) => {
                    warn!(
                        "conn {:?}: ack timeout on seq {} (attempt {}/{})",
                        self.key,
                        expected_seq,
                        attempt + 1,
                        self.config.retry_ceiling
                    );
                }
            }
        }
        Err(TransportError::RetryExhausted)
    }

    /// Accumulates chunks by dequeuing ingress segments until a chain
    /// terminates with `more=false`, preserving application-level framing.
    /// Duplicate segments are ACKed again but not re-appended. Returns
    /// `Err(TransportError::EndOfStream)` if a FIN is observed instead.
    pub fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let data_rx = self.data_rx.lock().unwrap();
        let mut buffer = Vec::new();
        loop {
            let segment = data_rx.recv().map_err(|_| TransportError::ShutDown)?;
            let mut state = self.state.lock().unwrap();
            let is_fin = segment.get_bool("fin");
            if segment.seq_num == state.recv_seq {
                self.emit_ack(segment.seq_num);
                state.recv_seq ^= 1;
                if is_fin {
                    state.fin_received = true;
                    state.closed = true;
                    debug!("conn {:?}: fin accepted", self.key);
                    return Err(TransportError::EndOfStream);
                }
                if let Some(Value::String(encoded)) = segment.get("data") {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(encoded)
                        .unwrap_or_default();
                    buffer.extend_from_slice(&decoded);
                }
                let more = segment.get("more").and_then(Value::as_bool).unwrap_or(true);
                if !more {
                    return Ok(buffer);
                }
            } else {
                trace!(
                    "conn {:?}: duplicate segment seq {}, re-acking without delivery",
                    self.key,
                    segment.seq_num
                );
                self.emit_ack(segment.seq_num);
                if is_fin && state.fin_received {
                    return Err(TransportError::EndOfStream);
                }
            }
        }
    }

    /// Sends a FIN and waits for its ACK.
    pub fn close(&self) -> Result<(), TransportError> {
        let seq = {
            let state = self.state.lock().unwrap();
            state.send_seq
        };
        let segment = Segment::new(seq, false).with("fin", Value::Bool(true));
        self.send_until_acked(segment, seq)?;
        let mut state = self.state.lock().unwrap();
        state.send_seq ^= 1;
        state.closed = true;
        debug!("conn {:?}: closed", self.key);
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::link::SimpleLink;
    use crate::physical::UdpSimulated;
    use crate::topology::{ArpTable, NodeName};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn host_network(port: u16, local: NodeName) -> Arc<HostNetwork> {
        let config = Arc::new(Config::default());
        let physical =
            UdpSimulated::bind(Address::new(Ipv4Addr::new(127, 0, 0, 1), port), config.clone())
                .unwrap();
        let link = SimpleLink::new(physical, local.vip_mac_for_test(), ArpTable::for_node(local));
        Arc::new(HostNetwork::new(link, local.vip(), &config))
    }

    // Test helper only: the real topology MACs are used in production.
    impl NodeName {
        fn vip_mac_for_test(self) -> crate::address::MacAddress {
            crate::topology::mac_for_vip(&self.vip())
        }
    }

    #[test]
    fn send_without_a_listening_peer_exhausts_retries() {
        let net = host_network(19100, NodeName::Alice);
        let key = ConnectionKey {
            remote_vip: NodeName::Bob.vip(),
            remote_port: 1,
            local_port: 2,
        };
        // No peer is listening, so this must time out and report exhaustion
        // rather than hang indefinitely.
        let mut fast_config = Config::default();
        fast_config.ack_timeout = std::time::Duration::from_millis(5);
        fast_config.retry_ceiling = 2;
        let conn = ReliableConnection::new(key, net, fast_config);
        let result = conn.send(b"hello");
        assert!(matches!(result, Err(TransportError::RetryExhausted)));
    }

    #[test]
    fn duplicate_data_segment_is_acked_but_not_redelivered() {
        let net = host_network(19101, NodeName::Alice);
        let key = ConnectionKey {
            remote_vip: NodeName::Bob.vip(),
            remote_port: 1,
            local_port: 2,
        };
        let conn = ReliableConnection::new(key, net, Config::default());
        let encode = |b: &[u8]| base64::engine::general_purpose::STANDARD.encode(b);

        let first = Segment::new(0, false)
            .with("data", Value::String(encode(b"hi")))
            .with("more", Value::Bool(false));
        conn.dispatch(first.clone());
        assert_eq!(conn.receive().unwrap(), b"hi");

        // A retransmitted duplicate of the already-consumed segment 0
        // arrives (peer never saw our ack), followed by the real next
        // message on seq 1. The duplicate must be acked but not folded
        // into the next message's assembly.
        conn.dispatch(first);
        let second = Segment::new(1, false)
            .with("data", Value::String(encode(b"bye")))
            .with("more", Value::Bool(false));
        conn.dispatch(second);
        assert_eq!(conn.receive().unwrap(), b"bye");
    }

    #[test]
    fn fin_ends_receive_with_end_of_stream() {
        let net = host_network(19102, NodeName::Alice);
        let key = ConnectionKey {
            remote_vip: NodeName::Bob.vip(),
            remote_port: 1,
            local_port: 2,
        };
        let conn = ReliableConnection::new(key, net, Config::default());
        let fin = Segment::new(0, false).with("fin", Value::Bool(true));
        conn.dispatch(fin);
        let result = conn.receive();
        assert!(matches!(result, Err(TransportError::EndOfStream)));
        assert!(conn.fin_received());
    }
}
