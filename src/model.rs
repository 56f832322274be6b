//! In-memory topology model.
//!
//! The builder produces one [`TopologySpec`] that both emitters
//! consume. Everything an emitter needs is resolved here: hostnames,
//! node definitions, interface slots and addresses, link endpoints,
//! coordinates and rendered configuration text. Emitters never compute
//! addresses or names themselves.

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

use crate::layout::Point;

/// Kind of a generated interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// A cabled port that appears in the emitted document.
    Physical,
    /// A configuration-only interface (DMVPN tunnel). Never emitted as
    /// a port and never linked.
    Tunnel,
}

/// One interface on a node.
#[derive(Debug, Clone)]
pub struct InterfaceSpec {
    /// Slot number on the device. Tunnel interfaces use a high sentinel
    /// slot outside the physical range.
    pub slot: u32,
    pub kind: InterfaceKind,
    /// Interface address, if addressed.
    pub address: Option<Ipv4Network>,
    /// VRF the interface is placed in, if any.
    pub vrf: Option<String>,
    /// Free-text description rendered into the configuration.
    pub description: Option<String>,
}

impl InterfaceSpec {
    pub fn physical(slot: u32) -> InterfaceSpec {
        InterfaceSpec {
            slot,
            kind: InterfaceKind::Physical,
            address: None,
            vrf: None,
            description: None,
        }
    }

    pub fn addressed(slot: u32, address: Ipv4Network) -> InterfaceSpec {
        InterfaceSpec {
            slot,
            kind: InterfaceKind::Physical,
            address: Some(address),
            vrf: None,
            description: None,
        }
    }
}

/// Role a node plays in the topology. Drives template selection and
/// emission details like link hiding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Router,
    Switch,
    ExternalConnector,
    /// Shared-services host (DNS).
    ServicesHost,
}

/// One node of the topology.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub hostname: String,
    /// Platform node definition, e.g. `iosv` or `unmanaged_switch`.
    pub definition: String,
    pub role: NodeRole,
    /// Router number within its mode's numbering, when it has one.
    pub number: Option<u32>,
    pub loopback: Option<Ipv4Network>,
    pub interfaces: Vec<InterfaceSpec>,
    pub position: Point,
    /// Rendered device configuration, filled in after the build.
    pub configuration: Option<String>,
    /// Hide this node's links on the canvas (management fabric).
    pub hide_links: bool,
}

impl NodeSpec {
    pub fn new(hostname: impl Into<String>, definition: impl Into<String>, role: NodeRole) -> NodeSpec {
        NodeSpec {
            hostname: hostname.into(),
            definition: definition.into(),
            role,
            number: None,
            loopback: None,
            interfaces: Vec::new(),
            position: Point::new(0, 0),
            configuration: None,
            hide_links: false,
        }
    }

    /// Append an interface and return its slot.
    pub fn push_interface(&mut self, iface: InterfaceSpec) -> u32 {
        let slot = iface.slot;
        self.interfaces.push(iface);
        slot
    }

    /// Find an interface by slot.
    pub fn interface(&self, slot: u32) -> Option<&InterfaceSpec> {
        self.interfaces.iter().find(|i| i.slot == slot)
    }
}

/// One point-to-point cable. Endpoints are (node index, slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSpec {
    pub a_node: usize,
    pub a_slot: u32,
    pub b_node: usize,
    pub b_slot: u32,
}

/// DNS zone entry collected during the build.
#[derive(Debug, Clone)]
pub struct DnsEntry {
    pub name: String,
    pub address: Ipv4Addr,
}

/// A fully built topology, ready for either emitter.
#[derive(Debug, Clone)]
pub struct TopologySpec {
    pub title: String,
    /// Human-readable description embedding the generating parameters.
    pub description: String,
    /// Declarative schema version for offline emission.
    pub schema_version: String,
    /// Machine-readable parameter restatement carried in the document
    /// notes.
    pub notes: String,
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
    /// Zone data for the shared-services host, when one exists.
    pub dns_entries: Vec<DnsEntry>,
}

impl TopologySpec {
    /// Indices of all router nodes in insertion order.
    pub fn routers(&self) -> impl Iterator<Item = (usize, &NodeSpec)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.role == NodeRole::Router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_lookup_by_slot() {
        let mut node = NodeSpec::new("R1", "iosv", NodeRole::Router);
        node.push_interface(InterfaceSpec::physical(0));
        node.push_interface(InterfaceSpec::physical(5));
        assert!(node.interface(5).is_some());
        assert!(node.interface(3).is_none());
    }

    #[test]
    fn test_router_iteration_skips_infrastructure() {
        let topo = TopologySpec {
            title: "t".to_string(),
            description: String::new(),
            schema_version: "0.3.0".to_string(),
            notes: String::new(),
            generated_at: Utc::now(),
            nodes: vec![
                NodeSpec::new("SW0", "unmanaged_switch", NodeRole::Switch),
                NodeSpec::new("R1", "iosv", NodeRole::Router),
                NodeSpec::new("R2", "iosv", NodeRole::Router),
            ],
            links: Vec::new(),
            dns_entries: Vec::new(),
        };
        let routers: Vec<usize> = topo.routers().map(|(i, _)| i).collect();
        assert_eq!(routers, vec![1, 2]);
    }
}
