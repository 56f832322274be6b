//! Typed synthesis parameters.
//!
//! The CLI (or any other front-end) validates raw arguments and hands
//! the engine a [`SynthesisParams`] value. The core never re-validates
//! what it receives here beyond the guardrail arithmetic that depends
//! on combinations of values.

use ipnetwork::Ipv4Network;
use serde::Serialize;

/// Topology mode selecting the graph-construction and addressing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Gateway + shared-services host + routers chained point-to-point.
    Sequential,
    /// Random shell-cluster mesh with a shared-services host on the
    /// highest-degree router.
    Mesh,
    /// Two-tier switch fabric, every router on one access port.
    Flat,
    /// Flat fabric where only odd routers attach; odd/even router pairs
    /// link directly on a dedicated slot.
    FlatPair,
    /// DMVPN hub-spoke over a flat or flat-pair NBMA underlay.
    Dmvpn,
}

/// Device family of the generated routers. Determines the platform
/// node definition and the exact physical interface naming the target
/// platform expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Iosv,
    Csr1000v,
}

impl DeviceFamily {
    /// Platform node-definition string.
    pub fn node_definition(&self) -> &'static str {
        match self {
            DeviceFamily::Iosv => "iosv",
            DeviceFamily::Csr1000v => "csr1000v",
        }
    }

    /// Physical interface label for a slot. The two families use
    /// different naming conventions and the platform rejects labels
    /// that do not match the node definition exactly.
    pub fn interface_label(&self, slot: u32) -> String {
        match self {
            DeviceFamily::Iosv => format!("GigabitEthernet0/{}", slot),
            DeviceFamily::Csr1000v => format!("GigabitEthernet{}", slot + 1),
        }
    }

    /// Router-side slot used for the management interface. csr1000v
    /// numbers ports from 1, so the requested management port N lives
    /// in slot N-1 there.
    pub fn mgmt_slot(&self, requested: u32) -> u32 {
        match self {
            DeviceFamily::Iosv => requested,
            DeviceFamily::Csr1000v => requested.saturating_sub(1),
        }
    }
}

/// Underlay fabric used by DMVPN mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DmvpnUnderlay {
    Flat,
    FlatPair,
}

/// Routing protocol over the DMVPN tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DmvpnRouting {
    Eigrp,
    Ospf,
}

/// Tunnel protection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Unprotected GRE.
    None,
    /// IPsec with a pre-shared key.
    Psk,
    /// IPsec with certificate trust; one hub doubles as the CA and
    /// every other router receives an enrollment block.
    Pki,
}

/// DMVPN-specific parameters.
#[derive(Debug, Clone, Serialize)]
pub struct DmvpnOptions {
    pub nbma_cidr: Ipv4Network,
    pub tunnel_cidr: Ipv4Network,
    pub underlay: DmvpnUnderlay,
    pub phase: u8,
    pub routing: DmvpnRouting,
    pub security: SecurityMode,
    /// Pre-shared key, required when `security` is `Psk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    pub tunnel_key: u32,
    /// Router numbers designated as hubs. Empty means hub set {1}.
    pub hubs: Vec<u32>,
    /// Configure even (non-endpoint) routers as EIGRP stubs in the
    /// flat-pair underlay.
    pub eigrp_stub: bool,
}

/// Out-of-band management fabric options.
#[derive(Debug, Clone, Serialize)]
pub struct MgmtOptions {
    /// Pool the per-router management addresses are drawn from.
    pub cidr: Ipv4Network,
    /// Requested management port number on each router.
    pub slot: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<std::net::Ipv4Addr>,
}

/// NTP stanza options.
#[derive(Debug, Clone, Serialize)]
pub struct NtpOptions {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
}

/// Validated shape parameters for one synthesis run.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisParams {
    pub mode: Mode,
    /// Number of routers to generate.
    pub nodes: u32,
    /// Routers per access switch in the flat fabrics.
    pub group_size: u32,
    /// Base layout distance between adjacent nodes.
    pub distance: i64,
    /// Lab title.
    pub title: String,
    /// Configuration template name.
    pub template: String,
    /// Device family for routers.
    pub device: DeviceFamily,
    /// Declarative schema version for offline emission.
    pub schema_version: String,
    /// Use 10.255.C.D/32 loopbacks in the flat fabrics instead of 10.20.C.D/32.
    pub loopback_255: bool,
    /// Use 10.0.C.D/16 fabric addresses instead of 10.10.C.D/16.
    pub gi0_zero: bool,
    /// VRF applied to the odd router's pairing interface in flat-pair mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_vrf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgmt: Option<MgmtOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntp: Option<NtpOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmvpn: Option<DmvpnOptions>,
    /// Bypass the licensing soft cap.
    pub allow_oversubscribe: bool,
}

impl SynthesisParams {
    /// /16 base for flat-fabric interface addressing.
    pub fn fabric_base(&self) -> Ipv4Network {
        let base = if self.gi0_zero { "10.0.0.0/16" } else { "10.10.0.0/16" };
        base.parse().expect("static CIDR")
    }

    /// /16 base for flat-fabric loopback addressing.
    pub fn loopback_base(&self) -> Ipv4Network {
        let base = if self.loopback_255 { "10.255.0.0/16" } else { "10.20.0.0/16" };
        base.parse().expect("static CIDR")
    }

    /// One-line summary of the generating parameters, embedded into the
    /// lab description for auditability.
    pub fn summary(&self) -> String {
        let mut bits: Vec<String> = vec![
            format!("nodes={}", self.nodes),
            format!("-m {}", mode_name(self.mode)),
            format!("-T {}", self.template),
        ];
        if self.device.node_definition() != self.template {
            bits.push(format!("--device-template {}", self.device.node_definition()));
        }
        match self.mode {
            Mode::Flat | Mode::FlatPair => {
                bits.push(format!("--flat-group-size {}", self.group_size));
                if self.loopback_255 {
                    bits.push("--loopback-255".to_string());
                }
                if self.gi0_zero {
                    bits.push("--gi0-zero".to_string());
                }
            }
            Mode::Dmvpn => {
                if let Some(d) = &self.dmvpn {
                    bits.push(format!("--dmvpn-underlay {}", underlay_name(d.underlay)));
                    bits.push(format!("--dmvpn-phase {}", d.phase));
                    bits.push(format!("--dmvpn-routing {:?}", d.routing).to_lowercase());
                    bits.push(format!("--dmvpn-security {:?}", d.security).to_lowercase());
                    bits.push(format!("--dmvpn-nbma-cidr {}", d.nbma_cidr));
                    bits.push(format!("--dmvpn-tunnel-cidr {}", d.tunnel_cidr));
                    if !d.hubs.is_empty() {
                        let hubs: Vec<String> = d.hubs.iter().map(|h| h.to_string()).collect();
                        bits.push(format!("--dmvpn-hubs {}", hubs.join(",")));
                    }
                }
                bits.push(format!("--flat-group-size {}", self.group_size));
            }
            _ => {}
        }
        if let Some(vrf) = &self.pair_vrf {
            bits.push(format!("--pair-vrf {}", vrf));
        }
        if let Some(mgmt) = &self.mgmt {
            bits.push("--mgmt".to_string());
            bits.push(format!("--mgmt-cidr {}", mgmt.cidr));
            bits.push(format!("--mgmt-slot {}", mgmt.slot));
            if let Some(vrf) = &mgmt.vrf {
                bits.push(format!("--mgmt-vrf {}", vrf));
            }
            if let Some(gw) = &mgmt.gateway {
                bits.push(format!("--mgmt-gw {}", gw));
            }
        }
        if let Some(ntp) = &self.ntp {
            bits.push(format!("--ntp {}", ntp.server));
            if let Some(vrf) = &ntp.vrf {
                bits.push(format!("--ntp-vrf {}", vrf));
            }
        }
        bits.push(format!("--schema-version {}", self.schema_version));
        bits.join(" ")
    }
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Sequential => "sequential",
        Mode::Mesh => "mesh",
        Mode::Flat => "flat",
        Mode::FlatPair => "flat-pair",
        Mode::Dmvpn => "dmvpn",
    }
}

fn underlay_name(underlay: DmvpnUnderlay) -> &'static str {
    match underlay {
        DmvpnUnderlay::Flat => "flat",
        DmvpnUnderlay::FlatPair => "flat-pair",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_labels_per_family() {
        assert_eq!(DeviceFamily::Iosv.interface_label(0), "GigabitEthernet0/0");
        assert_eq!(DeviceFamily::Iosv.interface_label(5), "GigabitEthernet0/5");
        assert_eq!(DeviceFamily::Csr1000v.interface_label(0), "GigabitEthernet1");
        assert_eq!(DeviceFamily::Csr1000v.interface_label(4), "GigabitEthernet5");
    }

    #[test]
    fn test_mgmt_slot_adjustment() {
        assert_eq!(DeviceFamily::Iosv.mgmt_slot(5), 5);
        assert_eq!(DeviceFamily::Csr1000v.mgmt_slot(5), 4);
    }

    #[test]
    fn test_summary_embeds_shape_parameters() {
        let params = SynthesisParams {
            mode: Mode::Flat,
            nodes: 5,
            group_size: 20,
            distance: 200,
            title: "lab".to_string(),
            template: "iosv".to_string(),
            device: DeviceFamily::Iosv,
            schema_version: "0.3.0".to_string(),
            loopback_255: true,
            gi0_zero: false,
            pair_vrf: None,
            mgmt: None,
            ntp: None,
            dmvpn: None,
            allow_oversubscribe: false,
        };
        let summary = params.summary();
        assert!(summary.contains("nodes=5"));
        assert!(summary.contains("-m flat"));
        assert!(summary.contains("--flat-group-size 20"));
        assert!(summary.contains("--loopback-255"));
    }
}
