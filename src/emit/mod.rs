//! Topology emission backends.
//!
//! The builder hands both backends the same [`TopologySpec`]; an
//! emitter only realizes it, it never computes names or addresses. The
//! offline backend writes a declarative lab document, the live backend
//! drives a controller through [`ControllerClient`].

pub mod live;
pub mod offline;

use crate::error::Result;
use crate::model::{NodeRole, NodeSpec, TopologySpec};

/// A backend that realizes a built topology.
pub trait Emitter {
    fn emit(&mut self, topo: &TopologySpec) -> Result<()>;
}

/// Controller operations the live backend needs. Implementations wrap
/// the actual controller API; tests substitute a mock.
pub trait ControllerClient: Send + Sync {
    /// Create an empty lab, returning its identifier.
    fn create_lab(&self, title: &str, description: &str, notes: &str) -> Result<String>;
    /// Create a node, returning its identifier.
    fn create_node(&self, lab: &str, node: &NodeSpec) -> Result<String>;
    /// Create an interface in the given slot, returning its identifier.
    fn create_interface(&self, lab: &str, node_id: &str, label: &str, slot: u32) -> Result<String>;
    /// Cable two interfaces together.
    fn create_link(&self, lab: &str, a_iface: &str, b_iface: &str) -> Result<String>;
    /// Attach a day-zero configuration to a node.
    fn assign_configuration(&self, lab: &str, node_id: &str, configuration: &str) -> Result<()>;
    /// Export the lab as a declarative document.
    fn export_lab(&self, lab: &str) -> Result<String>;
    /// Start the lab.
    fn start_lab(&self, lab: &str) -> Result<()>;
}

/// Interface label as the target platform names it. Labels are part of
/// the emitted document and must match the node definition exactly.
pub(crate) fn interface_label(node: &NodeSpec, slot: u32) -> String {
    match node.role {
        NodeRole::Switch => format!("port{slot}"),
        NodeRole::ExternalConnector => "port".to_string(),
        NodeRole::ServicesHost => format!("eth{slot}"),
        NodeRole::Router => match node.definition.as_str() {
            "csr1000v" => format!("GigabitEthernet{}", slot + 1),
            _ => format!("GigabitEthernet0/{slot}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_labels_by_role() {
        let sw = NodeSpec::new("SW0", "unmanaged_switch", NodeRole::Switch);
        assert_eq!(interface_label(&sw, 3), "port3");

        let host = NodeSpec::new("dns-host", "alpine", NodeRole::ServicesHost);
        assert_eq!(interface_label(&host, 1), "eth1");

        let iosv = NodeSpec::new("R1", "iosv", NodeRole::Router);
        assert_eq!(interface_label(&iosv, 0), "GigabitEthernet0/0");

        let csr = NodeSpec::new("R1", "csr1000v", NodeRole::Router);
        assert_eq!(interface_label(&csr, 0), "GigabitEthernet1");

        let ext = NodeSpec::new("ext-conn-0", "external_connector", NodeRole::ExternalConnector);
        assert_eq!(interface_label(&ext, 0), "port");
    }
}
