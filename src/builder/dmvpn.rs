//! DMVPN hub-spoke overlay on top of a flat or flat-pair NBMA fabric.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::addressing::{derive_flat_loopback, nth_host, AddressAllocator};
use crate::config::Config;
use crate::error::{Result, TopoError};
use crate::guardrails;
use crate::layout::{grid_steps, Point};
use crate::model::{InterfaceKind, InterfaceSpec, NodeRole, NodeSpec, TopologySpec};
use crate::params::{DmvpnOptions, DmvpnRouting, DmvpnUnderlay, SecurityMode, SynthesisParams};
use crate::render::{self, DmvpnContext, HubInfo, RenderContext};

use super::flat_pair::pair_addresses;
use super::{add_link, add_node, attach_to_switch, build_switch_fabric, new_topology};

/// Configuration-only slot for the tunnel interface, outside any
/// physical port range.
pub(crate) const TUNNEL_SLOT: u32 = 1000;

fn hub_set(options: &DmvpnOptions, total: u32, underlay: DmvpnUnderlay) -> Result<BTreeSet<u32>> {
    let hubs: BTreeSet<u32> = if options.hubs.is_empty() {
        BTreeSet::from([1])
    } else {
        options.hubs.iter().copied().collect()
    };
    for &hub in &hubs {
        if hub == 0 || hub > total {
            return Err(TopoError::Configuration(format!(
                "hub {hub} is outside the router range 1..={total}"
            )));
        }
        if underlay == DmvpnUnderlay::FlatPair && hub % 2 == 0 {
            return Err(TopoError::Configuration(format!(
                "hub {hub} is not a DMVPN endpoint: only odd routers terminate tunnels in the paired underlay"
            )));
        }
    }
    Ok(hubs)
}

fn check_cidr_capacity(options: &DmvpnOptions, max_rnum: u32) -> Result<()> {
    let usable = |net: ipnetwork::Ipv4Network| (1u64 << (32 - net.prefix())).saturating_sub(2);
    if max_rnum as u64 > usable(options.nbma_cidr) {
        return Err(TopoError::Configuration(format!(
            "NBMA CIDR {} is too small for router number {max_rnum}",
            options.nbma_cidr
        )));
    }
    if max_rnum as u64 > usable(options.tunnel_cidr) {
        return Err(TopoError::Configuration(format!(
            "tunnel CIDR {} is too small for router number {max_rnum}",
            options.tunnel_cidr
        )));
    }
    Ok(())
}

pub(crate) fn build(
    params: &SynthesisParams,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<TopologySpec> {
    let Some(options) = &params.dmvpn else {
        return Err(TopoError::Configuration(
            "DMVPN mode requires DMVPN options".to_string(),
        ));
    };
    if !params.template.ends_with("-dmvpn") || !render::template_exists(&params.template) {
        return Err(TopoError::Configuration(format!(
            "DMVPN mode requires a '-dmvpn' template, got '{}'",
            params.template
        )));
    }
    let companion = match options.underlay {
        DmvpnUnderlay::FlatPair => Some(render::companion_eigrp_template(&params.template)?),
        DmvpnUnderlay::Flat => None,
    };

    let total = params.nodes;
    let hubs = hub_set(options, total, options.underlay)?;
    let max_endpoint = match options.underlay {
        DmvpnUnderlay::Flat => total,
        DmvpnUnderlay::FlatPair => {
            if total % 2 == 1 {
                total
            } else {
                total - 1
            }
        }
    };
    check_cidr_capacity(options, max_endpoint)?;

    let endpoint_count = match options.underlay {
        DmvpnUnderlay::Flat => total,
        DmvpnUnderlay::FlatPair => total.div_ceil(2),
    };
    let num_access = guardrails::validate_flat_topology(endpoint_count, params.group_size)?;
    let rows = match options.underlay {
        DmvpnUnderlay::Flat => params.group_size,
        DmvpnUnderlay::FlatPair => params.group_size * 2,
    };
    let (step_x, step_y) = grid_steps(params.distance, num_access, rows);

    log::warn!(
        "[dmvpn/{}] creating {} routers ({} DMVPN endpoints, hubs {:?})",
        match options.underlay {
            DmvpnUnderlay::Flat => "flat",
            DmvpnUnderlay::FlatPair => "flat-pair",
        },
        total,
        endpoint_count,
        hubs
    );

    let mut topo = new_topology(params, generated_at)?;
    let fabric = build_switch_fabric(
        &mut topo,
        "SWnbma",
        num_access,
        Point::new(0, 0),
        |i| Point::new((i as i64 + 1) * step_x, 0).clamped(),
        false,
    );

    let pairs = match options.underlay {
        DmvpnUnderlay::FlatPair => {
            let mut alloc = AddressAllocator::new(config.loopbacks, config.p2pnets)?;
            pair_addresses(&mut alloc, total)?
        }
        DmvpnUnderlay::Flat => Vec::new(),
    };

    let loopback_base = params.loopback_base();
    let mut router_indices = Vec::with_capacity(total as usize);

    for idx in 0..total {
        let rnum = idx + 1;
        let is_endpoint = options.underlay == DmvpnUnderlay::Flat || rnum % 2 == 1;

        let mut node = NodeSpec::new(
            format!("R{rnum}"),
            params.device.node_definition(),
            NodeRole::Router,
        );
        node.number = Some(rnum);
        node.loopback = Some(derive_flat_loopback(rnum, loopback_base));

        let (sw_index, y_index) = match options.underlay {
            DmvpnUnderlay::Flat => ((idx / params.group_size) as usize, idx % params.group_size),
            DmvpnUnderlay::FlatPair => (
                ((idx / 2) / params.group_size) as usize,
                idx % (params.group_size * 2),
            ),
        };
        node.position =
            Point::new((sw_index as i64 + 1) * step_x, (y_index as i64 + 1) * step_y).clamped();

        if is_endpoint {
            let mut nbma_if = InterfaceSpec::addressed(0, nth_host(options.nbma_cidr, rnum)?);
            nbma_if.description = Some("dmvpn nbma".to_string());
            node.push_interface(nbma_if);

            if options.underlay == DmvpnUnderlay::FlatPair {
                let mut pair_if = InterfaceSpec::physical(1);
                pair_if.description = Some("pair link".to_string());
                pair_if.address = pairs
                    .iter()
                    .find(|(odd, _, _)| *odd == rnum)
                    .map(|(_, first, _)| *first);
                node.push_interface(pair_if);
            }

            node.push_interface(InterfaceSpec {
                slot: TUNNEL_SLOT,
                kind: InterfaceKind::Tunnel,
                address: Some(nth_host(options.tunnel_cidr, rnum)?),
                vrf: None,
                description: Some("dmvpn tunnel".to_string()),
            });
        } else {
            let mut pair_if = InterfaceSpec::physical(0);
            pair_if.description = Some("pair link".to_string());
            pair_if.address = pairs
                .iter()
                .find(|(odd, _, _)| *odd == rnum - 1)
                .map(|(_, _, second)| *second);
            node.push_interface(pair_if);
        }

        let node_idx = add_node(&mut topo, node);
        router_indices.push(node_idx);

        if is_endpoint {
            let endpoint_idx = match options.underlay {
                DmvpnUnderlay::Flat => rnum,
                DmvpnUnderlay::FlatPair => (rnum + 1) / 2,
            };
            let sw = ((endpoint_idx - 1) / params.group_size) as usize;
            attach_to_switch(&mut topo, &fabric, sw, node_idx, 0);
        }
    }

    if options.underlay == DmvpnUnderlay::FlatPair {
        for (odd, _, _) in &pairs {
            let odd_idx = router_indices[(*odd - 1) as usize];
            let even_idx = router_indices[*odd as usize];
            add_link(&mut topo, odd_idx, 1, even_idx, 0);
        }
    }

    // Every spoke's configuration references every hub's two addresses.
    let mut hub_info = Vec::with_capacity(hubs.len());
    for &hub in &hubs {
        hub_info.push(HubInfo {
            nbma: nth_host(options.nbma_cidr, hub)?.ip(),
            tunnel: nth_host(options.tunnel_cidr, hub)?.ip(),
        });
    }

    // Under certificate trust the lowest-numbered hub doubles as the CA;
    // enrollment runs over the NBMA fabric, which is up before any
    // tunnel is.
    let ca_number = match options.security {
        SecurityMode::Pki => hubs.iter().next().copied(),
        _ => None,
    };
    let ca_address = match ca_number {
        Some(n) => Some(nth_host(options.nbma_cidr, n)?.ip()),
        None => None,
    };

    let eigrp_stub = options.eigrp_stub && options.routing == DmvpnRouting::Eigrp;
    let overlay_vrf = params.pair_vrf.clone();

    for idx in 0..total {
        let rnum = idx + 1;
        let node_idx = router_indices[idx as usize];
        let is_endpoint = options.underlay == DmvpnUnderlay::Flat || rnum % 2 == 1;

        let dmvpn_ctx = DmvpnContext {
            phase: options.phase,
            routing: options.routing,
            security: options.security,
            psk: options.psk.clone(),
            tunnel_key: options.tunnel_key,
            is_hub: hubs.contains(&rnum),
            is_ca: ca_number == Some(rnum),
            ca_address,
            hub_info: hub_info.clone(),
            eigrp_stub,
            vrf: if is_endpoint { overlay_vrf.clone() } else { None },
        };
        let ctx = RenderContext {
            config,
            origin: None,
            mgmt: None,
            ntp: params.ntp.as_ref().map(|n| render::NtpContext {
                server: n.server.clone(),
                vrf: n.vrf.clone(),
            }),
            dmvpn: Some(dmvpn_ctx),
            generated_at,
        };
        let template = if is_endpoint {
            params.template.as_str()
        } else {
            companion.as_deref().unwrap_or(params.template.as_str())
        };
        let rendered = render::render(template, &topo.nodes[node_idx], &ctx)?;
        topo.nodes[node_idx].configuration = Some(rendered);
    }

    let hubs_str: Vec<String> = hub_info.iter().map(|h| h.tunnel.to_string()).collect();
    log::warn!(
        "[dmvpn] NBMA: {} | Tunnel: {} | Hubs(tunnel): {}",
        options.nbma_cidr,
        options.tunnel_cidr,
        hubs_str.join(",")
    );

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

    fn dmvpn_params(nodes: u32, underlay: DmvpnUnderlay) -> SynthesisParams {
        let mut params = testutil::params(Mode::Dmvpn, nodes);
        params.template = "iosv-dmvpn".to_string();
        params.dmvpn = Some(DmvpnOptions {
            nbma_cidr: "10.10.0.0/16".parse().unwrap(),
            tunnel_cidr: "172.20.0.0/16".parse().unwrap(),
            underlay,
            phase: 2,
            routing: DmvpnRouting::Eigrp,
            security: SecurityMode::None,
            psk: None,
            tunnel_key: 10,
            hubs: vec![1],
            eigrp_stub: false,
        });
        params
    }

    fn find(topo: &TopologySpec, hostname: &str) -> usize {
        topo.nodes.iter().position(|n| n.hostname == hostname).unwrap()
    }

    #[test]
    fn test_hub_and_spoke_addressing_offsets() {
        let params = dmvpn_params(4, DmvpnUnderlay::Flat);
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        let r1 = &topo.nodes[find(&topo, "R1")];
        assert_eq!(r1.interface(0).unwrap().address.unwrap(), "10.10.0.1/16".parse().unwrap());
        assert_eq!(
            r1.interface(TUNNEL_SLOT).unwrap().address.unwrap(),
            "172.20.0.1/16".parse().unwrap()
        );

        // Spokes reference hub 1's two addresses in their configs.
        for hostname in ["R2", "R3", "R4"] {
            let cfg = topo.nodes[find(&topo, hostname)].configuration.as_ref().unwrap();
            assert!(cfg.contains("ip nhrp map 172.20.0.1 10.10.0.1"));
            assert!(cfg.contains("ip nhrp nhs 172.20.0.1"));
        }
        let hub_cfg = topo.nodes[find(&topo, "R1")].configuration.as_ref().unwrap();
        assert!(hub_cfg.contains("ip nhrp map multicast dynamic"));
    }

    #[test]
    fn test_hub_out_of_range_is_rejected() {
        let mut params = dmvpn_params(4, DmvpnUnderlay::Flat);
        params.dmvpn.as_mut().unwrap().hubs = vec![9];
        let config = Config::default();
        let err = build(&params, &config, fixed_ts()).unwrap_err();
        assert!(matches!(err, TopoError::Configuration(_)));
    }

    #[test]
    fn test_even_hub_rejected_in_paired_underlay() {
        let mut params = dmvpn_params(6, DmvpnUnderlay::FlatPair);
        params.dmvpn.as_mut().unwrap().hubs = vec![2];
        let config = Config::default();
        assert!(build(&params, &config, fixed_ts()).is_err());
    }

    #[test]
    fn test_paired_underlay_splits_roles() {
        let params = dmvpn_params(6, DmvpnUnderlay::FlatPair);
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        // Odd routers are endpoints with NBMA + pair + tunnel.
        let r3 = &topo.nodes[find(&topo, "R3")];
        assert!(r3.interface(0).unwrap().description.as_deref() == Some("dmvpn nbma"));
        assert!(r3.interface(TUNNEL_SLOT).is_some());
        // Even routers run the interior-routing template instead.
        let r4 = &topo.nodes[find(&topo, "R4")];
        assert!(r4.interface(TUNNEL_SLOT).is_none());
        let cfg = r4.configuration.as_ref().unwrap();
        assert!(cfg.contains("router eigrp"));
        assert!(!cfg.contains("interface Tunnel0"));
    }

    #[test]
    fn test_multiple_hubs_all_referenced() {
        let mut params = dmvpn_params(5, DmvpnUnderlay::Flat);
        params.dmvpn.as_mut().unwrap().hubs = vec![1, 3];
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        let cfg = topo.nodes[find(&topo, "R2")].configuration.as_ref().unwrap();
        assert!(cfg.contains("ip nhrp nhs 172.20.0.1"));
        assert!(cfg.contains("ip nhrp nhs 172.20.0.3"));
    }

    #[test]
    fn test_pki_designates_lowest_hub_as_ca() {
        let mut params = dmvpn_params(4, DmvpnUnderlay::Flat);
        {
            let d = params.dmvpn.as_mut().unwrap();
            d.hubs = vec![3, 1];
            d.security = SecurityMode::Pki;
        }
        let config = Config::default();
        let topo = build(&params, &config, fixed_ts()).unwrap();

        let ca_cfg = topo.nodes[find(&topo, "R1")].configuration.as_ref().unwrap();
        assert!(ca_cfg.contains("crypto pki server LAB-CA"));
        let spoke_cfg = topo.nodes[find(&topo, "R2")].configuration.as_ref().unwrap();
        assert!(spoke_cfg.contains("enrollment url http://10.10.0.1:80"));
        // The other hub enrolls like any client.
        let hub3_cfg = topo.nodes[find(&topo, "R3")].configuration.as_ref().unwrap();
        assert!(hub3_cfg.contains("crypto pki trustpoint LAB-CA"));
        assert!(!hub3_cfg.contains("crypto pki server"));
    }

    #[test]
    fn test_plain_template_rejected() {
        let mut params = dmvpn_params(4, DmvpnUnderlay::Flat);
        params.template = "iosv".to_string();
        let config = Config::default();
        assert!(build(&params, &config, fixed_ts()).is_err());
    }

    #[test]
    fn test_cidr_too_small_is_rejected() {
        let mut params = dmvpn_params(4, DmvpnUnderlay::Flat);
        params.dmvpn.as_mut().unwrap().nbma_cidr = "10.10.0.0/30".parse().unwrap();
        let config = Config::default();
        assert!(build(&params, &config, fixed_ts()).is_err());
    }
}
