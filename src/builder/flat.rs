//! Flat fabric: two-tier switch hierarchy with every router on one
//! access port, addressed by router number.

use chrono::{DateTime, Utc};

use crate::addressing::{derive_flat_address, derive_flat_loopback, nth_host};
use crate::config::Config;
use crate::error::Result;
use crate::guardrails;
use crate::layout::{grid_steps, Point};
use crate::model::{InterfaceSpec, NodeRole, NodeSpec, TopologySpec};
use crate::params::SynthesisParams;
use crate::render::{self, RenderContext};

use super::{add_node, attach_to_switch, build_switch_fabric, new_topology, Fabric};

/// X position of the hidden management core switch.
const OOB_CORE_X: i64 = -200;

/// Build the out-of-band management fabric and give every router a
/// management interface attached to it. Shared with flat-pair mode.
pub(crate) fn build_mgmt_fabric(
    topo: &mut TopologySpec,
    params: &SynthesisParams,
) -> Option<Fabric> {
    params.mgmt.as_ref()?;
    let num_oob = params.nodes.div_ceil(params.group_size);
    let distance = params.distance;
    Some(build_switch_fabric(
        topo,
        "SWoob",
        num_oob,
        Point::new(OOB_CORE_X, 0),
        |i| Point::new(OOB_CORE_X - (i as i64 + 1) * distance, (i as i64 + 1) * distance).clamped(),
        true,
    ))
}

/// Management interface for one router, addressed by router number out
/// of the management pool.
pub(crate) fn mgmt_interface(params: &SynthesisParams, rnum: u32) -> Result<Option<InterfaceSpec>> {
    let Some(mgmt) = &params.mgmt else {
        return Ok(None);
    };
    let slot = params.device.mgmt_slot(mgmt.slot);
    let mut iface = InterfaceSpec::addressed(slot, nth_host(mgmt.cidr, rnum)?);
    iface.description = Some("oob management".to_string());
    iface.vrf = mgmt.vrf.clone();
    Ok(Some(iface))
}

/// Render context pieces shared by the flat-family modes.
pub(crate) fn mgmt_context(params: &SynthesisParams) -> Option<render::MgmtContext> {
    params.mgmt.as_ref().map(|m| render::MgmtContext {
        vrf: m.vrf.clone(),
        gateway: m.gateway,
    })
}

pub(crate) fn ntp_context(params: &SynthesisParams) -> Option<render::NtpContext> {
    params.ntp.as_ref().map(|n| render::NtpContext {
        server: n.server.clone(),
        vrf: n.vrf.clone(),
    })
}

pub(crate) fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let num_access = guardrails::validate_flat_topology(params.nodes, params.group_size)?;
    let (step_x, step_y) = grid_steps(params.distance, num_access, params.group_size);

    log::warn!(
        "[flat] creating {} access switches for {} routers (group size {})",
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

        let mut iface = InterfaceSpec::addressed(0, derive_flat_address(rnum, fabric_base));
        iface.description = Some("flat fabric".to_string());
        node.push_interface(iface);
        if let Some(mi) = mgmt_interface(params, rnum)? {
            node.push_interface(mi);
        }

        let node_idx = add_node(&mut topo, node);
        attach_to_switch(&mut topo, &fabric, sw_index, node_idx, 0);
        if let (Some(oob), Some(slot)) = (&oob, mgmt_slot) {
            attach_to_switch(&mut topo, oob, sw_index, node_idx, slot);
        }
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
