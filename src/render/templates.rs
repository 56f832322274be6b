//! Built-in configuration templates.
//!
//! Each template is a pure function of the node, the render context
//! and the device family. The family only changes interface naming;
//! the configuration body is shared.

use ipnetwork::Ipv4Network;
use std::fmt::Write;
use std::net::Ipv4Addr;

use crate::model::{InterfaceKind, NodeSpec};
use crate::params::{DeviceFamily, DmvpnRouting, SecurityMode};
use crate::render::RenderContext;

const EIGRP_AS: u32 = 100;
const OSPF_PROCESS: u32 = 1;

fn mask(net: Ipv4Network) -> Ipv4Addr {
    net.mask()
}

fn wildcard(net: Ipv4Network) -> Ipv4Addr {
    Ipv4Addr::from(!u32::from(net.mask()))
}

/// Common preamble: identity, name services, credentials, vty access.
fn header(node: &NodeSpec, ctx: &RenderContext) -> String {
    let cfg = ctx.config;
    let mut out = String::new();
    let _ = write!(
        out,
        "hostname {}\n\
         !\n\
         ! generated at {}\n\
         !\n\
         service timestamps log datetime msec\n\
         no ip domain lookup\n\
         ip domain name {}\n\
         ip name-server {}\n\
         !\n\
         username {} privilege 15 secret {}\n\
         !\n\
         line vty 0 4\n\
         \x20login local\n\
         \x20transport input ssh\n\
         !\n",
        node.hostname,
        ctx.generated_at.format("%Y-%m-%dT%H:%M:%SZ"),
        cfg.domainname,
        cfg.nameserver,
        cfg.username,
        cfg.password,
    );
    out
}

/// VRF definitions for every VRF referenced by the node's interfaces
/// or the management stanza. Emitted once, before any interface uses
/// the name.
fn vrf_definitions(node: &NodeSpec, ctx: &RenderContext) -> String {
    let mut names: Vec<&str> = node
        .interfaces
        .iter()
        .filter_map(|i| i.vrf.as_deref())
        .collect();
    if let Some(mgmt) = &ctx.mgmt {
        if let Some(vrf) = mgmt.vrf.as_deref() {
            names.push(vrf);
        }
    }
    if let Some(dmvpn) = &ctx.dmvpn {
        if let Some(vrf) = dmvpn.vrf.as_deref() {
            names.push(vrf);
        }
    }
    names.sort_unstable();
    names.dedup();

    let mut out = String::new();
    for name in names {
        let _ = write!(
            out,
            "vrf definition {name}\n\
             \x20address-family ipv4\n\
             \x20exit-address-family\n\
             !\n"
        );
    }
    out
}

/// Loopback plus all physical interfaces. Tunnel interfaces are
/// rendered by the DMVPN template, never here.
fn interfaces(node: &NodeSpec, family: DeviceFamily) -> String {
    let mut out = String::new();
    if let Some(loopback) = node.loopback {
        let _ = write!(
            out,
            "interface Loopback0\n\
             \x20ip address {} {}\n\
             !\n",
            loopback.ip(),
            mask(loopback),
        );
    }
    for iface in &node.interfaces {
        if iface.kind != InterfaceKind::Physical {
            continue;
        }
        let _ = writeln!(out, "interface {}", family.interface_label(iface.slot));
        if let Some(desc) = &iface.description {
            let _ = writeln!(out, " description {desc}");
        }
        if let Some(vrf) = &iface.vrf {
            let _ = writeln!(out, " vrf forwarding {vrf}");
        }
        match iface.address {
            Some(addr) => {
                let _ = writeln!(out, " ip address {} {}", addr.ip(), mask(addr));
            }
            None => {
                let _ = writeln!(out, " no ip address");
            }
        }
        out.push_str(" no shutdown\n!\n");
    }
    out
}

/// Management default route and NTP stanza.
fn trailer(node: &NodeSpec, ctx: &RenderContext) -> String {
    let mut out = String::new();
    if let Some(origin) = ctx.origin {
        let _ = writeln!(out, "ip route 0.0.0.0 0.0.0.0 {origin}");
        out.push_str("!\n");
    }
    if let Some(mgmt) = &ctx.mgmt {
        if let Some(gw) = mgmt.gateway {
            match &mgmt.vrf {
                Some(vrf) => {
                    let _ = writeln!(out, "ip route vrf {vrf} 0.0.0.0 0.0.0.0 {gw}");
                }
                None => {
                    let _ = writeln!(out, "ip route 0.0.0.0 0.0.0.0 {gw}");
                }
            }
            out.push_str("!\n");
        }
    }
    if let Some(ntp) = &ctx.ntp {
        match &ntp.vrf {
            Some(vrf) => {
                let _ = writeln!(out, "ntp server vrf {vrf} {}", ntp.server);
            }
            None => {
                let _ = writeln!(out, "ntp server {}", ntp.server);
            }
        }
        out.push_str("!\n");
    }
    let _ = node;
    out
}

/// Addressed networks for routing statements: loopback plus every
/// addressed physical interface outside the management stanza.
fn routed_networks(node: &NodeSpec) -> Vec<Ipv4Network> {
    let mut nets = Vec::new();
    if let Some(loopback) = node.loopback {
        nets.push(loopback);
    }
    for iface in &node.interfaces {
        if iface.kind == InterfaceKind::Physical {
            if let Some(addr) = iface.address {
                nets.push(addr);
            }
        }
    }
    nets
}

/// General-purpose router template: OSPF over everything addressed.
pub fn base_router(node: &NodeSpec, ctx: &RenderContext, family: DeviceFamily) -> String {
    let mut out = header(node, ctx);
    out.push_str(&vrf_definitions(node, ctx));
    out.push_str(&interfaces(node, family));
    let nets = routed_networks(node);
    if !nets.is_empty() {
        let _ = writeln!(out, "router ospf {OSPF_PROCESS}");
        for net in nets {
            let _ = writeln!(out, " network {} {} area 0", net.ip(), wildcard(net));
        }
        out.push_str("!\n");
    }
    out.push_str(&trailer(node, ctx));
    out.push_str("end\n");
    out
}

/// Interior-routing template for the non-endpoint half of a paired
/// fabric: EIGRP over the pairing link and the loopback.
pub fn eigrp_router(node: &NodeSpec, ctx: &RenderContext, family: DeviceFamily) -> String {
    let mut out = header(node, ctx);
    out.push_str(&vrf_definitions(node, ctx));
    out.push_str(&interfaces(node, family));
    let nets = routed_networks(node);
    if !nets.is_empty() {
        let _ = writeln!(out, "router eigrp {EIGRP_AS}");
        for net in nets {
            let _ = writeln!(out, " network {} {}", net.ip(), wildcard(net));
        }
        let stub = ctx.dmvpn.as_ref().is_some_and(|d| d.eigrp_stub);
        if stub {
            out.push_str(" eigrp stub connected summary\n");
        }
        out.push_str("!\n");
    }
    out.push_str(&trailer(node, ctx));
    out.push_str("end\n");
    out
}

/// IPsec protection preamble shared by hub and spokes.
fn crypto_block(security: SecurityMode, psk: Option<&str>) -> String {
    let auth = match security {
        SecurityMode::Psk => "pre-share",
        SecurityMode::Pki => "rsa-sig",
        SecurityMode::None => return String::new(),
    };
    let mut out = String::new();
    let _ = write!(
        out,
        "crypto isakmp policy 10\n\
         \x20encryption aes 256\n\
         \x20authentication {auth}\n\
         \x20group 14\n"
    );
    if security == SecurityMode::Psk {
        if let Some(key) = psk {
            let _ = writeln!(out, "crypto isakmp key {key} address 0.0.0.0");
        }
    }
    out.push_str(
        "crypto ipsec transform-set DMVPN-TS esp-aes 256 esp-sha256-hmac\n\
         \x20mode transport\n\
         crypto ipsec profile DMVPN-PROFILE\n\
         \x20set transform-set DMVPN-TS\n\
         !\n",
    );
    out
}

/// DMVPN endpoint template: NBMA-facing interface, multipoint GRE
/// tunnel overlay, overlay routing. Hubs and spokes share the template
/// and diverge on the NHRP role.
pub fn dmvpn_router(node: &NodeSpec, ctx: &RenderContext, family: DeviceFamily) -> String {
    let Some(dmvpn) = &ctx.dmvpn else {
        // The registry only routes here with a DMVPN context present.
        return base_router(node, ctx, family);
    };

    let mut out = header(node, ctx);
    out.push_str(&vrf_definitions(node, ctx));
    out.push_str(&crypto_block(dmvpn.security, dmvpn.psk.as_deref()));
    out.push_str(&interfaces(node, family));

    let tunnel = node
        .interfaces
        .iter()
        .find(|i| i.kind == InterfaceKind::Tunnel)
        .and_then(|i| i.address);

    if let Some(tunnel_addr) = tunnel {
        out.push_str("interface Tunnel0\n description dmvpn tunnel\n");
        if let Some(vrf) = &dmvpn.vrf {
            let _ = writeln!(out, " vrf forwarding {vrf}");
        }
        let _ = writeln!(out, " ip address {} {}", tunnel_addr.ip(), mask(tunnel_addr));
        out.push_str(" no ip redirects\n");
        let _ = writeln!(out, " ip nhrp network-id {}", dmvpn.tunnel_key);
        if dmvpn.is_hub {
            out.push_str(" ip nhrp map multicast dynamic\n");
            if dmvpn.phase == 3 {
                out.push_str(" ip nhrp redirect\n");
            }
            if dmvpn.routing == DmvpnRouting::Eigrp {
                let _ = writeln!(out, " no ip split-horizon eigrp {EIGRP_AS}");
                if dmvpn.phase == 2 {
                    let _ = writeln!(out, " no ip next-hop-self eigrp {EIGRP_AS}");
                }
            }
        } else {
            for hub in &dmvpn.hub_info {
                let _ = writeln!(out, " ip nhrp map {} {}", hub.tunnel, hub.nbma);
                let _ = writeln!(out, " ip nhrp map multicast {}", hub.nbma);
                let _ = writeln!(out, " ip nhrp nhs {}", hub.tunnel);
            }
            if dmvpn.phase == 3 {
                out.push_str(" ip nhrp shortcut\n");
            }
        }
        if dmvpn.routing == DmvpnRouting::Ospf {
            out.push_str(" ip ospf network broadcast\n");
            let priority = if dmvpn.is_hub { 255 } else { 0 };
            let _ = writeln!(out, " ip ospf priority {priority}");
        }
        let _ = writeln!(out, " tunnel source {}", family.interface_label(0));
        out.push_str(" tunnel mode gre multipoint\n");
        let _ = writeln!(out, " tunnel key {}", dmvpn.tunnel_key);
        if dmvpn.security != SecurityMode::None {
            out.push_str(" tunnel protection ipsec profile DMVPN-PROFILE\n");
        }
        out.push_str("!\n");
    }

    // Overlay routing: the tunnel, the loopback and any pairing links,
    // never the NBMA underlay itself (slot 0).
    let mut nets: Vec<Ipv4Network> = Vec::new();
    if let Some(t) = tunnel {
        nets.push(t);
    }
    if let Some(loopback) = node.loopback {
        nets.push(loopback);
    }
    for iface in &node.interfaces {
        if iface.kind == InterfaceKind::Physical && iface.slot != 0 {
            if let Some(addr) = iface.address {
                nets.push(addr);
            }
        }
    }
    match dmvpn.routing {
        DmvpnRouting::Eigrp => {
            let _ = writeln!(out, "router eigrp {EIGRP_AS}");
            for net in nets {
                let _ = writeln!(out, " network {} {}", net.ip(), wildcard(net));
            }
        }
        DmvpnRouting::Ospf => {
            let _ = writeln!(out, "router ospf {OSPF_PROCESS}");
            for net in nets {
                let _ = writeln!(out, " network {} {} area 0", net.ip(), wildcard(net));
            }
        }
    }
    out.push_str("!\n");
    out.push_str(&trailer(node, ctx));
    out.push_str("end\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{InterfaceSpec, NodeRole};
    use crate::render::{DmvpnContext, HubInfo};
    use chrono::TimeZone;
    use chrono::Utc;

    fn ctx(config: &Config) -> RenderContext<'_> {
        RenderContext {
            config,
            origin: None,
            mgmt: None,
            ntp: None,
            dmvpn: None,
            generated_at: Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap(),
        }
    }

    fn router(hostname: &str) -> NodeSpec {
        let mut node = NodeSpec::new(hostname, "iosv", NodeRole::Router);
        node.loopback = Some("10.20.0.1/32".parse().unwrap());
        node.push_interface(InterfaceSpec::addressed(0, "10.10.0.1/16".parse().unwrap()));
        node
    }

    #[test]
    fn test_base_router_addresses_and_ospf() {
        let config = Config::default();
        let out = base_router(&router("R1"), &ctx(&config), DeviceFamily::Iosv);
        assert!(out.starts_with("hostname R1\n"));
        assert!(out.contains("interface GigabitEthernet0/0\n"));
        assert!(out.contains(" ip address 10.10.0.1 255.255.0.0\n"));
        assert!(out.contains(" network 10.20.0.1 0.0.0.0 area 0\n"));
        assert!(out.contains(" network 10.10.0.1 0.0.255.255 area 0\n"));
        assert!(out.trim_end().ends_with("end"));
    }

    #[test]
    fn test_csr_interface_naming() {
        let config = Config::default();
        let out = base_router(&router("R1"), &ctx(&config), DeviceFamily::Csr1000v);
        assert!(out.contains("interface GigabitEthernet1\n"));
        assert!(!out.contains("GigabitEthernet0/0"));
    }

    #[test]
    fn test_spoke_references_every_hub() {
        let config = Config::default();
        let mut context = ctx(&config);
        context.dmvpn = Some(DmvpnContext {
            phase: 2,
            routing: DmvpnRouting::Eigrp,
            security: SecurityMode::None,
            psk: None,
            tunnel_key: 10,
            is_hub: false,
            is_ca: false,
            ca_address: None,
            hub_info: vec![
                HubInfo {
                    nbma: "10.10.0.1".parse().unwrap(),
                    tunnel: "172.20.0.1".parse().unwrap(),
                },
                HubInfo {
                    nbma: "10.10.0.3".parse().unwrap(),
                    tunnel: "172.20.0.3".parse().unwrap(),
                },
            ],
            eigrp_stub: false,
            vrf: None,
        });
        let mut node = router("R2");
        node.push_interface(InterfaceSpec {
            slot: 1000,
            kind: InterfaceKind::Tunnel,
            address: Some("172.20.0.2/16".parse().unwrap()),
            vrf: None,
            description: Some("dmvpn tunnel".to_string()),
        });
        let out = dmvpn_router(&node, &context, DeviceFamily::Iosv);
        assert!(out.contains(" ip nhrp map 172.20.0.1 10.10.0.1\n"));
        assert!(out.contains(" ip nhrp nhs 172.20.0.1\n"));
        assert!(out.contains(" ip nhrp map 172.20.0.3 10.10.0.3\n"));
        assert!(out.contains(" ip nhrp nhs 172.20.0.3\n"));
        assert!(out.contains(" tunnel mode gre multipoint\n"));
        // The NBMA underlay stays out of the overlay routing process.
        assert!(!out.contains(" network 10.10.0.1 0.0.255.255\n"));
    }

    #[test]
    fn test_hub_nhrp_role_and_psk_protection() {
        let config = Config::default();
        let mut context = ctx(&config);
        context.dmvpn = Some(DmvpnContext {
            phase: 3,
            routing: DmvpnRouting::Eigrp,
            security: SecurityMode::Psk,
            psk: Some("s3cret".to_string()),
            tunnel_key: 42,
            is_hub: true,
            is_ca: false,
            ca_address: None,
            hub_info: Vec::new(),
            eigrp_stub: false,
            vrf: None,
        });
        let mut node = router("R1");
        node.push_interface(InterfaceSpec {
            slot: 1000,
            kind: InterfaceKind::Tunnel,
            address: Some("172.20.0.1/16".parse().unwrap()),
            vrf: None,
            description: Some("dmvpn tunnel".to_string()),
        });
        let out = dmvpn_router(&node, &context, DeviceFamily::Iosv);
        assert!(out.contains(" ip nhrp map multicast dynamic\n"));
        assert!(out.contains(" ip nhrp redirect\n"));
        assert!(out.contains("crypto isakmp key s3cret address 0.0.0.0\n"));
        assert!(out.contains(" tunnel protection ipsec profile DMVPN-PROFILE\n"));
        assert!(out.contains(" tunnel key 42\n"));
    }

    #[test]
    fn test_eigrp_stub_toggle() {
        let config = Config::default();
        let mut context = ctx(&config);
        context.dmvpn = Some(DmvpnContext {
            phase: 2,
            routing: DmvpnRouting::Eigrp,
            security: SecurityMode::None,
            psk: None,
            tunnel_key: 10,
            is_hub: false,
            is_ca: false,
            ca_address: None,
            hub_info: Vec::new(),
            eigrp_stub: true,
            vrf: None,
        });
        let out = eigrp_router(&router("R2"), &context, DeviceFamily::Iosv);
        assert!(out.contains(" eigrp stub connected summary\n"));
    }

    #[test]
    fn test_vrf_definition_precedes_interface_use() {
        let config = Config::default();
        let mut node = router("R1");
        node.interfaces[0].vrf = Some("tenant".to_string());
        let out = base_router(&node, &ctx(&config), DeviceFamily::Iosv);
        let def = out.find("vrf definition tenant").unwrap();
        let use_at = out.find(" vrf forwarding tenant").unwrap();
        assert!(def < use_at);
    }
}
