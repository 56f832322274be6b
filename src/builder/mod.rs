//! Topology construction.
//!
//! One submodule per mode. Every mode follows the same sequence:
//! validate, allocate core resources, build the fabric, attach the
//! endpoints, render configurations. The first failure aborts the run
//! with no partial topology.

mod dmvpn;
mod flat;
mod flat_pair;
mod mesh;
mod sequential;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Result, TopoError};
use crate::guardrails;
use crate::layout::Point;
use crate::model::{InterfaceSpec, LinkSpec, NodeSpec, NodeRole, TopologySpec};
use crate::params::{Mode, SynthesisParams};

/// Node definition used for all generated switches.
pub(crate) const SWITCH_DEFINITION: &str = "unmanaged_switch";

/// Build the topology described by the parameters.
pub fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    guardrails::check_license_cap(params.nodes, params.allow_oversubscribe)?;
    match params.mode {
        Mode::Sequential => sequential::build(params, config, generated_at),
        Mode::Mesh => mesh::build(params, config, generated_at),
        Mode::Flat => flat::build(params, config, generated_at),
        Mode::FlatPair => flat_pair::build(params, config, generated_at),
        Mode::Dmvpn => dmvpn::build(params, config, generated_at),
    }
}

/// Empty topology with title, description and the machine-readable
/// parameter restatement filled in.
pub(crate) fn new_topology(
    params: &SynthesisParams,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let notes = serde_json::to_string(params)
        .map_err(|e| TopoError::Configuration(format!("cannot encode parameters: {e}")))?;
    Ok(TopologySpec {
        title: params.title.clone(),
        description: format!(
            "Generated by topoforge v{} | args: {}",
            env!("CARGO_PKG_VERSION"),
            params.summary()
        ),
        schema_version: params.schema_version.clone(),
        notes,
        generated_at,
        nodes: Vec::new(),
        links: Vec::new(),
        dns_entries: Vec::new(),
    })
}

/// Append a node and return its index.
pub(crate) fn add_node(topo: &mut TopologySpec, node: NodeSpec) -> usize {
    topo.nodes.push(node);
    topo.nodes.len() - 1
}

/// Cable two existing interfaces together.
pub(crate) fn add_link(topo: &mut TopologySpec, a: usize, a_slot: u32, b: usize, b_slot: u32) {
    topo.links.push(LinkSpec {
        a_node: a,
        a_slot,
        b_node: b,
        b_slot,
    });
}

/// Claim the next free port on a switch and return its slot.
pub(crate) fn next_switch_port(topo: &mut TopologySpec, switch: usize) -> u32 {
    let slot = topo.nodes[switch].interfaces.len() as u32;
    topo.nodes[switch].push_interface(InterfaceSpec::physical(slot))
}

/// A two-tier switch fabric: one core, `count` access switches, one
/// uplink each. Access port 0 is the uplink; router ports follow.
pub(crate) struct Fabric {
    pub core: usize,
    pub access: Vec<usize>,
}

pub(crate) fn build_switch_fabric(
    topo: &mut TopologySpec,
    prefix: &str,
    count: u32,
    core_pos: Point,
    access_pos: impl Fn(u32) -> Point,
    hidden: bool,
) -> Fabric {
    let mut core = NodeSpec::new(format!("{prefix}0"), SWITCH_DEFINITION, NodeRole::Switch);
    core.position = core_pos;
    core.hide_links = hidden;
    let core = add_node(topo, core);

    let mut access = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut sw = NodeSpec::new(
            format!("{prefix}{}", i + 1),
            SWITCH_DEFINITION,
            NodeRole::Switch,
        );
        sw.position = access_pos(i);
        sw.hide_links = hidden;
        let sw = add_node(topo, sw);
        access.push(sw);

        let core_port = next_switch_port(topo, core);
        let uplink = next_switch_port(topo, sw);
        add_link(topo, sw, uplink, core, core_port);
    }

    Fabric { core, access }
}

/// Attach a router interface to the given access switch.
pub(crate) fn attach_to_switch(
    topo: &mut TopologySpec,
    fabric: &Fabric,
    sw_index: usize,
    node: usize,
    node_slot: u32,
) {
    let port = next_switch_port(topo, fabric.access[sw_index]);
    add_link(topo, node, node_slot, fabric.access[sw_index], port);
}
