//! Configuration rendering.
//!
//! A small registry maps template names onto rendering functions. Every
//! function is pure: same node, same context, same timestamp, same
//! text. Certificate-trust blocks are added through the single
//! insertion point in [`pki`].

pub mod pki;
mod templates;

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::net::Ipv4Addr;

use crate::config::Config;
use crate::error::{Result, TopoError};
use crate::model::{DnsEntry, NodeSpec};
use crate::params::{DeviceFamily, DmvpnRouting, SecurityMode};

/// Template names the registry accepts.
pub const TEMPLATE_NAMES: &[&str] = &[
    "iosv",
    "csr1000v",
    "iosv-dmvpn",
    "csr-dmvpn",
    "iosv-eigrp",
    "csr-eigrp",
];

/// One hub's addresses as seen by every spoke.
#[derive(Debug, Clone)]
pub struct HubInfo {
    pub nbma: Ipv4Addr,
    pub tunnel: Ipv4Addr,
}

/// Management stanza context. The management interface itself is part
/// of the node's interface list; this only carries the stanza extras.
#[derive(Debug, Clone)]
pub struct MgmtContext {
    pub vrf: Option<String>,
    pub gateway: Option<Ipv4Addr>,
}

/// NTP stanza context.
#[derive(Debug, Clone)]
pub struct NtpContext {
    pub server: String,
    pub vrf: Option<String>,
}

/// Per-node DMVPN rendering context.
#[derive(Debug, Clone)]
pub struct DmvpnContext {
    pub phase: u8,
    pub routing: DmvpnRouting,
    pub security: SecurityMode,
    pub psk: Option<String>,
    pub tunnel_key: u32,
    pub is_hub: bool,
    /// This node hosts the certificate authority.
    pub is_ca: bool,
    /// Tunnel address of the CA, for enrollment URLs on other nodes.
    pub ca_address: Option<Ipv4Addr>,
    pub hub_info: Vec<HubInfo>,
    pub eigrp_stub: bool,
    /// VRF carrying the tunnel overlay, if any.
    pub vrf: Option<String>,
}

/// Everything a template sees besides the node itself.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub config: &'a Config,
    /// Default gateway, set only on the node facing the shared-services
    /// host.
    pub origin: Option<Ipv4Addr>,
    pub mgmt: Option<MgmtContext>,
    pub ntp: Option<NtpContext>,
    pub dmvpn: Option<DmvpnContext>,
    pub generated_at: DateTime<Utc>,
}

/// Whether a template name is known to the registry.
pub fn template_exists(name: &str) -> bool {
    TEMPLATE_NAMES.contains(&name)
}

/// Derive the interior-routing companion for a DMVPN template. The
/// paired underlay renders its non-endpoint routers with this template.
pub fn companion_eigrp_template(name: &str) -> Result<String> {
    let Some(stem) = name.strip_suffix("-dmvpn") else {
        return Err(TopoError::Configuration(format!(
            "paired DMVPN underlay requires a '-dmvpn' template, got '{name}'"
        )));
    };
    let companion = format!("{stem}-eigrp");
    if !template_exists(&companion) {
        return Err(TopoError::Configuration(format!(
            "paired DMVPN underlay requires companion template '{companion}'"
        )));
    }
    Ok(companion)
}

/// Render a node's configuration with the named template.
pub fn render(name: &str, node: &NodeSpec, ctx: &RenderContext) -> Result<String> {
    let rendered = match name {
        "iosv" => templates::base_router(node, ctx, DeviceFamily::Iosv),
        "csr1000v" => templates::base_router(node, ctx, DeviceFamily::Csr1000v),
        "iosv-dmvpn" => templates::dmvpn_router(node, ctx, DeviceFamily::Iosv),
        "csr-dmvpn" => templates::dmvpn_router(node, ctx, DeviceFamily::Csr1000v),
        "iosv-eigrp" => templates::eigrp_router(node, ctx, DeviceFamily::Iosv),
        "csr-eigrp" => templates::eigrp_router(node, ctx, DeviceFamily::Csr1000v),
        other => {
            return Err(TopoError::Configuration(format!(
                "template does not exist: {other}"
            )))
        }
    };

    let Some(dmvpn) = &ctx.dmvpn else {
        return Ok(rendered);
    };
    if dmvpn.security != SecurityMode::Pki || !name.ends_with("-dmvpn") {
        return Ok(rendered);
    }
    let block = if dmvpn.is_ca {
        pki::ca_server_block(&ctx.config.domainname, ctx.generated_at)
    } else {
        let Some(ca) = dmvpn.ca_address else {
            return Err(TopoError::Configuration(
                "certificate security enabled but no CA address resolved".to_string(),
            ));
        };
        pki::client_trust_block(&node.hostname, &ctx.config.domainname, ca, ctx.generated_at)
    };
    Ok(pki::splice_security_block(&rendered, &block))
}

/// Render the shared-services host: bring up its interfaces and start a
/// DNS resolver serving the zone collected during the build.
pub fn render_services_host(
    config: &Config,
    node: &NodeSpec,
    entries: &[DnsEntry],
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# {} services host\n\
         # generated at {}\n\
         hostname {}\n\
         ifconfig eth0 up\n\
         udhcpc -i eth0 -b\n",
        node.hostname,
        generated_at.format("%Y-%m-%dT%H:%M:%SZ"),
        node.hostname,
    );
    for iface in &node.interfaces {
        if let Some(addr) = iface.address {
            let _ = writeln!(
                out,
                "ifconfig eth{} {} netmask {} up",
                iface.slot,
                addr.ip(),
                addr.mask()
            );
        }
    }
    let _ = write!(
        out,
        "cat > /etc/dnsmasq.conf <<EOF\n\
         domain={domain}\n\
         local=/{domain}/\n\
         expand-hosts\n\
         addn-hosts=/etc/dnsmasq.hosts\n\
         EOF\n",
        domain = config.domainname,
    );
    out.push_str("cat > /etc/dnsmasq.hosts <<EOF\n");
    for entry in entries {
        let _ = writeln!(out, "{} {}.{} {}", entry.address, entry.name, config.domainname, entry.name);
    }
    out.push_str("EOF\ndnsmasq\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InterfaceSpec, NodeRole};
    use chrono::TimeZone;

    fn fixed_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_template_is_rejected() {
        let config = Config::default();
        let node = NodeSpec::new("R1", "iosv", NodeRole::Router);
        let ctx = RenderContext {
            config: &config,
            origin: None,
            mgmt: None,
            ntp: None,
            dmvpn: None,
            generated_at: fixed_ts(),
        };
        let err = render("iol", &node, &ctx).unwrap_err();
        assert!(matches!(err, TopoError::Configuration(_)));
    }

    #[test]
    fn test_companion_template_derivation() {
        assert_eq!(companion_eigrp_template("iosv-dmvpn").unwrap(), "iosv-eigrp");
        assert_eq!(companion_eigrp_template("csr-dmvpn").unwrap(), "csr-eigrp");
        assert!(companion_eigrp_template("iosv").is_err());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let config = Config::default();
        let mut node = NodeSpec::new("R1", "iosv", NodeRole::Router);
        node.loopback = Some("10.20.0.1/32".parse().unwrap());
        node.push_interface(InterfaceSpec::addressed(0, "10.10.0.1/16".parse().unwrap()));
        let ctx = RenderContext {
            config: &config,
            origin: None,
            mgmt: None,
            ntp: None,
            dmvpn: None,
            generated_at: fixed_ts(),
        };
        let a = render("iosv", &node, &ctx).unwrap();
        let b = render("iosv", &node, &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pki_block_spliced_into_dmvpn_config() {
        let config = Config::default();
        let mut node = NodeSpec::new("R3", "iosv", NodeRole::Router);
        node.loopback = Some("10.20.0.3/32".parse().unwrap());
        node.push_interface(InterfaceSpec::addressed(0, "10.10.0.3/16".parse().unwrap()));
        let ctx = RenderContext {
            config: &config,
            origin: None,
            mgmt: None,
            ntp: None,
            dmvpn: Some(DmvpnContext {
                phase: 2,
                routing: DmvpnRouting::Eigrp,
                security: SecurityMode::Pki,
                psk: None,
                tunnel_key: 10,
                is_hub: false,
                is_ca: false,
                ca_address: Some("172.20.0.1".parse().unwrap()),
                hub_info: Vec::new(),
                eigrp_stub: false,
                vrf: None,
            }),
            generated_at: fixed_ts(),
        };
        let out = render("iosv-dmvpn", &node, &ctx).unwrap();
        let trust = out.find("crypto pki trustpoint").unwrap();
        let end = out.rfind("end").unwrap();
        assert!(trust < end);
        assert!(out.contains("event manager applet CLOCK-BOOTSTRAP"));
    }

    #[test]
    fn test_services_host_zone_rendering() {
        let config = Config::default();
        let mut node = NodeSpec::new("dns-host", "alpine", NodeRole::ServicesHost);
        node.push_interface(InterfaceSpec::physical(0));
        node.push_interface(InterfaceSpec::addressed(1, "172.16.0.5/30".parse().unwrap()));
        let entries = vec![
            DnsEntry {
                name: "r1".to_string(),
                address: "10.0.0.1".parse().unwrap(),
            },
            DnsEntry {
                name: "dns-host-eth1".to_string(),
                address: "172.16.0.5".parse().unwrap(),
            },
        ];
        let out = render_services_host(&config, &node, &entries, fixed_ts());
        assert!(out.contains("ifconfig eth1 172.16.0.5 netmask 255.255.255.252 up"));
        assert!(out.contains("10.0.0.1 r1.virl.lab r1"));
        assert!(out.contains("dnsmasq"));
    }
}
