//! Process-wide topology and routing tables.
//!
//! Fixed across all four nodes, loaded once as static data: the whole
//! star topology is known ahead of time, so this is just a table, not
//! something discovered at startup.

use std::net::Ipv4Addr;

use crate::address::{Address, MacAddress, Port, VirtualIpAddress};

/// The logical port every chat client connects to on the server. Since
/// `ReliableTransport` has no separate bind/listen step, this is purely a
/// rendezvous convention: a client's first segment carries this as
/// `dst_port`, which becomes the server-side connection's `local_port`
/// once the demultiplexer creates the passive connection.
pub const CHAT_SERVER_PORT: Port = 7777;

/// One of the four fixed nodes in this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeName {
    Alice,
    Bob,
    Server,
    Router,
}

impl NodeName {
    pub fn vip(self) -> VirtualIpAddress {
        VirtualIpAddress::new(match self {
            NodeName::Alice => "HOST_A",
            NodeName::Bob => "HOST_B",
            NodeName::Server => "HOST_S",
            NodeName::Router => "HOST_R",
        })
    }

    pub fn is_router(self) -> bool {
        matches!(self, NodeName::Router)
    }
}

/// One row of the topology table: a node's VIP, MAC, and real (IP, port).
#[derive(Debug, Clone)]
pub struct TopologyEntry {
    pub name: NodeName,
    pub vip: VirtualIpAddress,
    pub mac: MacAddress,
    pub address: Address,
}

/// Returns the fixed four-entry topology table.
pub fn entries() -> Vec<TopologyEntry> {
    let loopback = Ipv4Addr::new(127, 0, 0, 1);
    vec![
        TopologyEntry {
            name: NodeName::Alice,
            vip: NodeName::Alice.vip(),
            mac: "AA:AA:AA:AA:AA:AA".parse().unwrap(),
            address: Address::new(loopback, 10000),
        },
        TopologyEntry {
            name: NodeName::Bob,
            vip: NodeName::Bob.vip(),
            mac: "BB:BB:BB:BB:BB:BB".parse().unwrap(),
            address: Address::new(loopback, 10001),
        },
        TopologyEntry {
            name: NodeName::Server,
            vip: NodeName::Server.vip(),
            mac: "CC:CC:CC:CC:CC:CC".parse().unwrap(),
            address: Address::new(loopback, 10002),
        },
        TopologyEntry {
            name: NodeName::Router,
            vip: NodeName::Router.vip(),
            mac: "DD:DD:DD:DD:DD:DD".parse().unwrap(),
            address: Address::new(loopback, 10003),
        },
    ]
}

/// Looks up a node's real (IP, port) by its MAC address.
///
/// # Panics
///
/// Panics if `mac` is not one of the four fixed MACs. An unknown MAC is a
/// programming error in this closed topology, not something to recover
/// from.
pub fn resolve_mac(mac: MacAddress) -> Address {
    entries()
        .into_iter()
        .find(|e| e.mac == mac)
        .map(|e| e.address)
        .unwrap_or_else(|| panic!("unknown MAC address {}, cannot resolve to a real endpoint", mac))
}

/// Looks up a node's MAC by its VIP.
///
/// # Panics
///
/// Panics if `vip` does not name one of the four fixed nodes.
pub fn mac_for_vip(vip: &VirtualIpAddress) -> MacAddress {
    entries()
        .into_iter()
        .find(|e| &e.vip == vip)
        .map(|e| e.mac)
        .unwrap_or_else(|| panic!("unknown VIP {}, no such node in this topology", vip))
}

/// The static ARP table for one node: every non-local VIP resolves to the
/// router's MAC on a host; on the router, every host VIP resolves to that
/// host's own MAC.
pub struct ArpTable {
    local: NodeName,
}

impl ArpTable {
    pub fn for_node(local: NodeName) -> Self {
        ArpTable { local }
    }

    /// Resolves the next-hop MAC to use when sending towards `dst_vip`.
    pub fn next_hop(&self, dst_vip: &VirtualIpAddress) -> MacAddress {
        match self.local {
            NodeName::Router => mac_for_vip(dst_vip),
            _ => mac_for_vip(&NodeName::Router.vip()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_route_to_router() {
        let arp = ArpTable::for_node(NodeName::Alice);
        assert_eq!(arp.next_hop(&NodeName::Bob.vip()), mac_for_vip(&NodeName::Router.vip()));
    }

    #[test]
    fn router_routes_to_host_itself() {
        let arp = ArpTable::for_node(NodeName::Router);
        assert_eq!(arp.next_hop(&NodeName::Bob.vip()), mac_for_vip(&NodeName::Bob.vip()));
    }

    #[test]
    #[should_panic(expected = "unknown VIP")]
    fn mac_for_unknown_vip_panics() {
        mac_for_vip(&VirtualIpAddress::new("HOST_X"));
    }
}
