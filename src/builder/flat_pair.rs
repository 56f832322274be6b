//! Paired flat fabric: odd routers sit on the access switches, each
//! odd router owns a direct /30 link to the following even router.

use chrono::{DateTime, Utc};

use crate::addressing::{derive_flat_address, derive_flat_loopback, AddressAllocator};
use crate::config::Config;
use crate::error::Result;
use crate::guardrails;
use crate::layout::{grid_steps, Point};
use crate::model::{InterfaceSpec, NodeRole, NodeSpec, TopologySpec};
use crate::params::SynthesisParams;
use crate::render::{self, RenderContext};

use super::flat::{build_mgmt_fabric, mgmt_context, mgmt_interface, ntp_context};
use super::{add_link, add_node, attach_to_switch, build_switch_fabric, new_topology};

/// /30 host pairs for the odd/even pairing links, keyed by the odd
/// router number. A trailing odd router without a partner gets none.
pub(crate) fn pair_addresses(
    alloc: &mut AddressAllocator,
    total: u32,
) -> Result<Vec<(u32, ipnetwork::Ipv4Network, ipnetwork::Ipv4Network)>> {
    let pairs = total / 2;
    guardrails::check_pool_capacity(pairs as u64, alloc.p2p_remaining(), "point-to-point")?;
    let mut out = Vec::with_capacity(pairs as usize);
    let mut odd = 1;
    while odd + 1 <= total {
        let (first, second) = alloc.next_p2p_pair()?;
        out.push((odd, first, second));
        odd += 2;
    }
    Ok(out)
}

pub(crate) fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let num_access = guardrails::validate_flat_topology(params.nodes, params.group_size)?;
    let (step_x, step_y) = grid_steps(params.distance, num_access, params.group_size);

    let mut alloc = AddressAllocator::new(config.loopbacks, config.p2pnets)?;
    let pairs = pair_addresses(&mut alloc, params.nodes)?;

    log::warn!(
        "[flat-pair] creating {} access switches for {} routers (group size {})",
        num_access,
        params.nodes,
        params.group_size
    );

    let mut topo = new_topology(params, generated_at)?;
    let fabric = build_switch_fabric(
        &mut topo,
        "SW",
        num_access,
        Point::new(0, 0),
        |i| Point::new((i as i64 + 1) * step_x, 0).clamped(),
        false,
    );
    let oob = build_mgmt_fabric(&mut topo, params);

    let fabric_base = params.fabric_base();
    let loopback_base = params.loopback_base();
    let mgmt_slot = params.mgmt.as_ref().map(|m| params.device.mgmt_slot(m.slot));

    let mut router_indices = Vec::with_capacity(params.nodes as usize);
    for idx in 0..params.nodes {
        let rnum = idx + 1;
        let sw_index = (idx / params.group_size) as usize;

        let mut node = NodeSpec::new(
            format!("R{rnum}"),
            params.device.node_definition(),
            NodeRole::Router,
        );
        node.number = Some(rnum);
        node.loopback = Some(derive_flat_loopback(rnum, loopback_base));
        node.position = Point::new(
            (sw_index as i64 + 1) * step_x,
            ((idx % params.group_size) as i64 + 1) * step_y,
        )
        .clamped();

        if rnum % 2 == 1 {
            let mut fabric_if = InterfaceSpec::addressed(0, derive_flat_address(rnum, fabric_base));
            fabric_if.description = Some("flat fabric".to_string());
            node.push_interface(fabric_if);

            // Unmatched trailing odd router keeps the slot, unaddressed.
            let mut pair_if = InterfaceSpec::physical(1);
            pair_if.description = Some("pair link".to_string());
            pair_if.vrf = params.pair_vrf.clone();
            pair_if.address = pairs
                .iter()
                .find(|(odd, _, _)| *odd == rnum)
                .map(|(_, first, _)| *first);
            node.push_interface(pair_if);
        } else {
            let mut pair_if = InterfaceSpec::physical(0);
            pair_if.description = Some("pair link".to_string());
            pair_if.address = pairs
                .iter()
                .find(|(odd, _, _)| *odd == rnum - 1)
                .map(|(_, _, second)| *second);
            node.push_interface(pair_if);
        }
        if let Some(mi) = mgmt_interface(params, rnum)? {
            node.push_interface(mi);
        }

        let node_idx = add_node(&mut topo, node);
        router_indices.push(node_idx);

        if rnum % 2 == 1 {
            attach_to_switch(&mut topo, &fabric, sw_index, node_idx, 0);
        }
        if let (Some(oob), Some(slot)) = (&oob, mgmt_slot) {
            attach_to_switch(&mut topo, oob, sw_index, node_idx, slot);
        }
    }

    // R1 slot 1 <-> R2 slot 0, R3 slot 1 <-> R4 slot 0, ...
    for (odd, _, _) in &pairs {
        let odd_idx = router_indices[(*odd - 1) as usize];
        let even_idx = router_indices[*odd as usize];
        add_link(&mut topo, odd_idx, 1, even_idx, 0);
    }

    let ctx = RenderContext {
        config,
        origin: None,
        mgmt: mgmt_context(params),
        ntp: ntp_context(params),
        dmvpn: None,
        generated_at,
    };
    for idx in 0..topo.nodes.len() {
        if topo.nodes[idx].role != NodeRole::Router {
            continue;
        }
        let rendered = render::render(&params.template, &topo.nodes[idx], &ctx)?;
        topo.nodes[idx].configuration = Some(rendered);
    }

    Ok(topo)
}
