//! Chained topology: gateway, shared-services host, routers in a line.

use chrono::{DateTime, Utc};

use crate::addressing::AddressAllocator;
use crate::config::Config;
use crate::error::Result;
use crate::guardrails;
use crate::layout::{Point, SpiralCoords};
use crate::model::{DnsEntry, InterfaceSpec, NodeRole, NodeSpec, TopologySpec};
use crate::params::SynthesisParams;
use crate::render::{self, RenderContext};

use super::{add_link, add_node, new_topology};

pub(crate) const EXT_CONN_NAME: &str = "ext-conn-0";
pub(crate) const SERVICES_HOST_NAME: &str = "dns-host";
pub(crate) const SERVICES_HOST_DEFINITION: &str = "alpine";

/// Hop count beyond which end-to-end reachability degrades; the chain
/// still builds, the user just gets told.
const HOP_ADVISORY: u32 = 32;

pub(crate) fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let mut alloc = AddressAllocator::new(config.loopbacks, config.p2pnets)?;
    guardrails::check_pool_capacity(params.nodes as u64, alloc.loopbacks_remaining(), "loopback")?;
    // one /30 per hop plus the services segment
    guardrails::check_pool_capacity(params.nodes as u64 + 1, alloc.p2p_remaining(), "point-to-point")?;

    if params.nodes > HOP_ADVISORY {
        log::warn!(
            "{} hops exceeds ~{} where TTL still reaches the far end; DNS will degrade along the chain",
            params.nodes,
            HOP_ADVISORY
        );
    }

    let mut topo = new_topology(params, generated_at)?;
    let mut coords = SpiralCoords::new(params.distance);

    let mut ext_conn = NodeSpec::new(EXT_CONN_NAME, "external_connector", NodeRole::ExternalConnector);
    ext_conn.position = Point::new(-params.distance, 0);
    ext_conn.push_interface(InterfaceSpec::physical(0));
    let ext_conn = add_node(&mut topo, ext_conn);
    log::info!("external connector: {EXT_CONN_NAME}");

    // The services segment: first host to the services host itself,
    // second to the first router's upstream interface.
    let (dns_addr, dns_via) = alloc.next_p2p_pair()?;
    let mut services = NodeSpec::new(SERVICES_HOST_NAME, SERVICES_HOST_DEFINITION, NodeRole::ServicesHost);
    services.position = coords.next().unwrap_or(Point::new(0, 0));
    services.push_interface(InterfaceSpec::physical(0));
    services.push_interface(InterfaceSpec::addressed(1, dns_addr));
    let services = add_node(&mut topo, services);
    add_link(&mut topo, ext_conn, 0, services, 0);
    log::info!("services host: {SERVICES_HOST_NAME}");

    // Routers answer DNS queries at the services host.
    let mut render_config = config.clone();
    render_config.nameserver = dns_addr.ip().to_string();

    let mut upstream = dns_via;
    let mut prev: (usize, u32) = (services, 1);
    for idx in 0..params.nodes {
        let hostname = format!("R{}", idx + 1);
        let loopback = alloc.next_loopback()?;
        let (downstream, next_upstream) = alloc.next_p2p_pair()?;

        let mut node = NodeSpec::new(&hostname, params.device.node_definition(), NodeRole::Router);
        node.number = Some(idx + 1);
        node.loopback = Some(loopback);
        node.position = coords.next().unwrap_or(Point::new(0, 0));
        node.push_interface(InterfaceSpec::addressed(0, downstream));
        node.push_interface(InterfaceSpec::addressed(1, upstream));
        let node_idx = add_node(&mut topo, node);

        add_link(&mut topo, prev.0, prev.1, node_idx, 1);
        log::info!("node: {hostname}");

        topo.dns_entries.push(DnsEntry {
            name: hostname.to_lowercase(),
            address: loopback.ip(),
        });

        prev = (node_idx, 0);
        upstream = next_upstream;
    }

    topo.dns_entries.push(DnsEntry {
        name: format!("{SERVICES_HOST_NAME}-eth1"),
        address: dns_addr.ip(),
    });

    let ctx = RenderContext {
        config: &render_config,
        origin: None,
        mgmt: None,
        ntp: params.ntp.as_ref().map(|n| render::NtpContext {
            server: n.server.clone(),
            vrf: n.vrf.clone(),
        }),
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
    let services_cfg =
        render::render_services_host(&render_config, &topo.nodes[services], &topo.dns_entries, generated_at);
    topo.nodes[services].configuration = Some(services_cfg);

    Ok(topo)
}
