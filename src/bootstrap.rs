//! Wires together the fixed four-node topology into a running
//! `HostNetwork`/`RouterNetwork` for one of the CLI entry points.

use std::sync::Arc;

use crate::config::Config;
use crate::link::SimpleLink;
use crate::network::{HostNetwork, RouterNetwork};
use crate::physical::UdpSimulated;
use crate::topology::{self, ArpTable, NodeName};

/// Binds the physical socket for `node` and layers link + host network on
/// top of it. Panics if `node` is the router: use `bootstrap_router`.
pub fn bootstrap_host(node: NodeName, config: Config) -> std::io::Result<HostNetwork> {
    assert!(!node.is_router(), "bootstrap_host called with the router node");
    let entry = topology::entries().into_iter().find(|e| e.name == node).expect("fixed topology entry");
    let physical = UdpSimulated::bind(entry.address, Arc::new(config))?;
    let link = SimpleLink::new(physical, entry.mac, ArpTable::for_node(node));
    Ok(HostNetwork::new(link, entry.vip, &config))
}

/// Binds the physical socket for the router and layers link + router
/// network on top of it, including the intake thread.
pub fn bootstrap_router(config: Config) -> std::io::Result<RouterNetwork> {
    let entry = topology::entries()
        .into_iter()
        .find(|e| e.name == NodeName::Router)
        .expect("fixed topology entry");
    let physical = UdpSimulated::bind(entry.address, Arc::new(config))?;
    let link = SimpleLink::new(physical, entry.mac, ArpTable::for_node(NodeName::Router));
    Ok(RouterNetwork::new(link))
}
