//! Random mesh: shell-clustered random graph with a shared-services
//! host hanging off the best-connected router.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::addressing::AddressAllocator;
use crate::config::Config;
use crate::error::Result;
use crate::guardrails;
use crate::layout::{force_directed, Point};
use crate::model::{DnsEntry, InterfaceSpec, NodeRole, NodeSpec, TopologySpec};
use crate::params::SynthesisParams;
use crate::render::{self, RenderContext};

use super::sequential::{EXT_CONN_NAME, SERVICES_HOST_DEFINITION, SERVICES_HOST_NAME};
use super::{add_link, add_node, new_topology};

/// Smallest cluster the shell construction will produce.
const MIN_CLUSTER: u32 = 20;

/// Shell sizes for the cluster construction: `node_count / 8` per
/// shell with a floor of 20, remainder in a trailing shell.
fn shell_sizes(node_count: u32) -> Vec<u32> {
    let size = (node_count / 8).max(MIN_CLUSTER);
    let clusters = node_count / size;
    let remain = node_count - clusters * size;
    let mut shells = vec![size; clusters as usize];
    if remain > 0 {
        shells.push(remain);
    }
    shells
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> UnionFind {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        true
    }
}

/// Random shell graph: dense random edges inside each shell, one
/// random edge between consecutive shells, then minimal augmentation
/// until the whole graph is connected.
fn random_shell_graph(node_count: u32, rng: &mut impl Rng) -> Vec<(usize, usize)> {
    let shells = shell_sizes(node_count);
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(shells.len());

    let mut start = 0usize;
    for &size in &shells {
        let size = size as usize;
        ranges.push((start, size));
        if size >= 2 {
            let max_edges = size * (size - 1) / 2;
            let want = (size * 2).min(max_edges);
            while edges
                .iter()
                .filter(|(a, _)| *a >= start && *a < start + size)
                .count()
                < want
            {
                let a = start + rng.gen_range(0..size);
                let b = start + rng.gen_range(0..size);
                if a == b {
                    continue;
                }
                edges.insert((a.min(b), a.max(b)));
            }
        }
        start += size;
    }

    for pair in ranges.windows(2) {
        let (s1, l1) = pair[0];
        let (s2, l2) = pair[1];
        let a = s1 + rng.gen_range(0..l1);
        let b = s2 + rng.gen_range(0..l2);
        edges.insert((a.min(b), a.max(b)));
    }

    // 1-edge augmentation between remaining components.
    let mut uf = UnionFind::new(node_count as usize);
    for &(a, b) in &edges {
        uf.union(a, b);
    }
    let mut order: Vec<usize> = (0..node_count as usize).collect();
    order.shuffle(rng);
    let anchor = order[0];
    for &node in &order[1..] {
        if uf.union(node, anchor) {
            edges.insert((node.min(anchor), node.max(anchor)));
        }
    }

    let mut out: Vec<(usize, usize)> = edges.into_iter().collect();
    out.sort_unstable();
    out
}

/// DNS label for one end of a link: both endpoint names and interface
/// labels, shortened and lowercased into a single legal hostname.
pub(crate) fn dns_label(src_host: &str, src_if: &str, dst_host: &str, dst_if: &str) -> String {
    let mut desc = format!("{src_host}-{src_if}--{dst_host}-{dst_if}");
    for (long, short) in [
        ("TenGigabitEthernet", "ten"),
        ("GigabitEthernet", "gi"),
        ("Ethernet", "e"),
    ] {
        if desc.contains(long) {
            desc = desc.replace(long, short);
            break;
        }
    }
    desc.replace('/', "_").replace(' ', "-").to_lowercase()
}

pub(crate) fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let n = params.nodes as usize;
    let mut rng = rand::thread_rng();
    let edges = random_shell_graph(params.nodes, &mut rng);

    let mut alloc = AddressAllocator::new(config.loopbacks, config.p2pnets)?;
    guardrails::check_pool_capacity(params.nodes as u64, alloc.loopbacks_remaining(), "loopback")?;
    // one /30 per edge plus the services segment
    guardrails::check_pool_capacity(
        edges.len() as u64 + 1,
        alloc.p2p_remaining(),
        "point-to-point",
    )?;

    log::warn!(
        "[mesh] {} routers, {} links",
        params.nodes,
        edges.len()
    );

    let mut topo = new_topology(params, generated_at)?;
    let positions = force_directed(n, &edges, params.distance);

    let mut router_indices = Vec::with_capacity(n);
    for i in 0..n {
        let mut node = NodeSpec::new(
            format!("R{}", i + 1),
            params.device.node_definition(),
            NodeRole::Router,
        );
        node.number = Some(i as u32 + 1);
        node.loopback = Some(alloc.next_loopback()?);
        node.position = positions[i];
        let idx = add_node(&mut topo, node);
        router_indices.push(idx);

        topo.dns_entries.push(DnsEntry {
            name: format!("r{}", i + 1),
            address: topo.nodes[idx].loopback.unwrap_or(config.loopbacks).ip(),
        });
    }

    // Wire the mesh, one /30 per edge, slots claimed in edge order.
    let mut next_slot = vec![0u32; n];
    for &(a, b) in &edges {
        let (addr_a, addr_b) = alloc.next_p2p_pair()?;
        let slot_a = next_slot[a];
        let slot_b = next_slot[b];
        next_slot[a] += 1;
        next_slot[b] += 1;

        let label_a = params.device.interface_label(slot_a);
        let label_b = params.device.interface_label(slot_b);
        let host_a = format!("R{}", a + 1);
        let host_b = format!("R{}", b + 1);

        let mut if_a = InterfaceSpec::addressed(slot_a, addr_a);
        if_a.description = Some(format!("to {host_b} {label_b}"));
        topo.nodes[router_indices[a]].push_interface(if_a);
        let mut if_b = InterfaceSpec::addressed(slot_b, addr_b);
        if_b.description = Some(format!("to {host_a} {label_a}"));
        topo.nodes[router_indices[b]].push_interface(if_b);

        add_link(&mut topo, router_indices[a], slot_a, router_indices[b], slot_b);

        topo.dns_entries.push(DnsEntry {
            name: dns_label(&host_a, &label_a, &host_b, &label_b),
            address: addr_a.ip(),
        });
        topo.dns_entries.push(DnsEntry {
            name: dns_label(&host_b, &label_b, &host_a, &label_a),
            address: addr_b.ip(),
        });
    }

    // The best-connected router carries the services segment.
    let core = (0..n)
        .max_by_key(|&i| (next_slot[i], std::cmp::Reverse(i)))
        .unwrap_or(0);
    log::warn!("[mesh] identified core node is R{}", core + 1);

    let mut ext_conn = NodeSpec::new(EXT_CONN_NAME, "external_connector", NodeRole::ExternalConnector);
    ext_conn.position = Point::new(0, 0);
    ext_conn.push_interface(InterfaceSpec::physical(0));
    let ext_conn = add_node(&mut topo, ext_conn);

    let (dns_addr, dns_via) = alloc.next_p2p_pair()?;
    let mut services = NodeSpec::new(SERVICES_HOST_NAME, SERVICES_HOST_DEFINITION, NodeRole::ServicesHost);
    services.position = Point::new(params.distance, 0);
    services.push_interface(InterfaceSpec::physical(0));
    services.push_interface(InterfaceSpec::addressed(1, dns_addr));
    let services = add_node(&mut topo, services);
    add_link(&mut topo, ext_conn, 0, services, 0);

    let core_slot = next_slot[core];
    let core_label = params.device.interface_label(core_slot);
    let core_host = format!("R{}", core + 1);
    let mut core_if = InterfaceSpec::addressed(core_slot, dns_via);
    core_if.description = Some(format!("to {SERVICES_HOST_NAME} eth1"));
    topo.nodes[router_indices[core]].push_interface(core_if);
    add_link(&mut topo, router_indices[core], core_slot, services, 1);

    topo.dns_entries.push(DnsEntry {
        name: dns_label(&core_host, &core_label, SERVICES_HOST_NAME, "eth1"),
        address: dns_via.ip(),
    });
    topo.dns_entries.push(DnsEntry {
        name: format!("{SERVICES_HOST_NAME}-eth1"),
        address: dns_addr.ip(),
    });

    let mut render_config = config.clone();
    render_config.nameserver = dns_addr.ip().to_string();

    for i in 0..n {
        let node_idx = router_indices[i];
        let ctx = RenderContext {
            config: &render_config,
            origin: if i == core { Some(dns_addr.ip()) } else { None },
            mgmt: None,
            ntp: params.ntp.as_ref().map(|nt| render::NtpContext {
                server: nt.server.clone(),
                vrf: nt.vrf.clone(),
            }),
            dmvpn: None,
            generated_at,
        };
        let rendered = render::render(&params.template, &topo.nodes[node_idx], &ctx)?;
        topo.nodes[node_idx].configuration = Some(rendered);
    }
    let services_cfg =
        render::render_services_host(&render_config, &topo.nodes[services], &topo.dns_entries, generated_at);
    topo.nodes[services].configuration = Some(services_cfg);

    Ok(topo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::testutil;
    use crate::params::Mode;
    use chrono::TimeZone;

    fn fixed_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_shell_sizes_floor_and_remainder() {
        assert_eq!(shell_sizes(10), vec![10]);
        assert_eq!(shell_sizes(20), vec![20]);
        assert_eq!(shell_sizes(45), vec![20, 20, 5]);
        assert_eq!(shell_sizes(240), vec![30, 30, 30, 30, 30, 30, 30, 30]);
    }

    #[test]
    fn test_graph_is_connected() {
        let mut rng = rand::thread_rng();
        for n in [2u32, 5, 21, 64] {
            let edges = random_shell_graph(n, &mut rng);
            let mut uf = UnionFind::new(n as usize);
            let mut components = n as usize;
            for (a, b) in edges {
                if uf.union(a, b) {
                    components -= 1;
                }
            }
            assert_eq!(components, 1, "graph of {n} nodes must be connected");
        }
    }

    #[test]
    fn test_dns_label_shortening() {
        let label = dns_label("R1", "GigabitEthernet0/1", "R2", "GigabitEthernet0/2");
        assert_eq!(label, "r1-gi0_1--r2-gi0_2");
        let label = dns_label("R3", "GigabitEthernet0/0", "dns-host", "eth1");
        assert_eq!(label, "r3-gi0_0--dns-host-eth1");
    }

    #[test]
    fn test_links_share_a_slash_30() {
        let params = testutil::params(Mode::Mesh, 8);
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        for link in &topo.links {
            let a = &topo.nodes[link.a_node];
            let b = &topo.nodes[link.b_node];
            if a.role != NodeRole::Router || b.role != NodeRole::Router {
                continue;
            }
            let addr_a = a.interface(link.a_slot).unwrap().address.unwrap();
            let addr_b = b.interface(link.b_slot).unwrap().address.unwrap();
            assert_eq!(addr_a.network(), addr_b.network());
            assert_ne!(addr_a.ip(), addr_b.ip());
        }
    }

    #[test]
    fn test_core_owns_services_segment_and_origin_route() {
        let params = testutil::params(Mode::Mesh, 6);
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        let services = topo
            .nodes
            .iter()
            .position(|n| n.role == NodeRole::ServicesHost)
            .unwrap();
        let dns_addr = topo.nodes[services].interfaces[1].address.unwrap();

        // Exactly one router carries the default route to the host.
        let with_origin: Vec<&NodeSpec> = topo
            .routers()
            .map(|(_, n)| n)
            .filter(|n| {
                n.configuration
                    .as_ref()
                    .is_some_and(|c| c.contains(&format!("ip route 0.0.0.0 0.0.0.0 {}", dns_addr.ip())))
            })
            .collect();
        assert_eq!(with_origin.len(), 1);

        // And that router is linked to the host's eth1.
        let core_link = topo
            .links
            .iter()
            .find(|l| l.b_node == services && l.b_slot == 1)
            .unwrap();
        assert_eq!(topo.nodes[core_link.a_node].hostname, with_origin[0].hostname);
    }

    #[test]
    fn test_every_router_reaches_the_mesh() {
        let params = testutil::params(Mode::Mesh, 12);
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        for (_, router) in topo.routers() {
            assert!(!router.interfaces.is_empty(), "{} is isolated", router.hostname);
            assert!(router.loopback.is_some());
        }
    }
}
