use clap::Parser;
use color_eyre::Result;
use env_logger::Env;
use ipnetwork::Ipv4Network;
use log::info;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use topoforge::builder;
use topoforge::config::Config;
use topoforge::emit::offline::OfflineEmitter;
use topoforge::emit::Emitter;
use topoforge::error::TopoError;
use topoforge::params::{
    DeviceFamily, DmvpnOptions, DmvpnRouting, DmvpnUnderlay, MgmtOptions, Mode, NtpOptions,
    SecurityMode, SynthesisParams,
};
use topoforge::render;

/// Topology synthesizer for virtual network labs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of routers to create
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(2..=1000))]
    nodes: u32,

    /// Topology mode
    #[arg(short, long, value_enum, default_value = "sequential")]
    mode: Mode,

    /// Lab name
    #[arg(short, long, default_value = "topoforge")]
    labname: String,

    /// Configuration template
    #[arg(short = 'T', long, default_value = "iosv")]
    template: String,

    /// Device family, when it differs from the template name
    #[arg(long, value_enum)]
    device_template: Option<DeviceFamily>,

    /// Routers per access switch in the flat fabrics
    #[arg(long, default_value_t = 20)]
    flat_group_size: u32,

    /// Base layout distance between adjacent nodes
    #[arg(long, default_value_t = 200)]
    distance: i64,

    /// Use 10.255.C.D/32 loopbacks in the flat fabrics
    #[arg(long)]
    loopback_255: bool,

    /// Use 10.0.C.D/16 fabric addresses in the flat fabrics
    #[arg(long)]
    gi0_zero: bool,

    /// VRF for the odd router's pairing interface in flat-pair mode
    #[arg(long)]
    pair_vrf: Option<String>,

    /// Output path for the lab document
    #[arg(short, long)]
    output: PathBuf,

    /// Replace the output file if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Declarative schema version written into the lab document
    #[arg(long, default_value = "0.3.0")]
    schema_version: String,

    /// Build an out-of-band management fabric
    #[arg(long)]
    mgmt: bool,

    /// Pool the per-router management addresses are drawn from
    #[arg(long, default_value = "10.200.0.0/16")]
    mgmt_cidr: Ipv4Network,

    /// Management port number on each router
    #[arg(long, default_value_t = 5)]
    mgmt_slot: u32,

    /// VRF for the management interface
    #[arg(long)]
    mgmt_vrf: Option<String>,

    /// Default gateway for the management network
    #[arg(long)]
    mgmt_gw: Option<Ipv4Addr>,

    /// NTP server pushed into router configurations
    #[arg(long)]
    ntp: Option<String>,

    /// VRF the NTP server is reachable in
    #[arg(long)]
    ntp_vrf: Option<String>,

    /// NBMA underlay address space for DMVPN mode
    #[arg(long, default_value = "10.10.0.0/16")]
    dmvpn_nbma_cidr: Ipv4Network,

    /// Tunnel overlay address space for DMVPN mode
    #[arg(long, default_value = "172.20.0.0/16")]
    dmvpn_tunnel_cidr: Ipv4Network,

    /// Underlay fabric for DMVPN mode
    #[arg(long, value_enum, default_value = "flat")]
    dmvpn_underlay: DmvpnUnderlay,

    /// DMVPN phase
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
    dmvpn_phase: u8,

    /// Routing protocol over the tunnel overlay
    #[arg(long, value_enum, default_value = "eigrp")]
    dmvpn_routing: DmvpnRouting,

    /// Tunnel protection mode
    #[arg(long, value_enum, default_value = "none")]
    dmvpn_security: SecurityMode,

    /// Pre-shared key for --dmvpn-security psk
    #[arg(long)]
    dmvpn_psk: Option<String>,

    /// NHRP network id and GRE tunnel key
    #[arg(long, default_value_t = 10)]
    dmvpn_tunnel_key: u32,

    /// Router numbers designated as hubs (default: 1)
    #[arg(long, value_delimiter = ',')]
    dmvpn_hubs: Vec<u32>,

    /// Configure non-endpoint routers as EIGRP stubs (flat-pair underlay)
    #[arg(long)]
    dmvpn_eigrp_stub: bool,

    /// Bypass the licensing soft cap
    #[arg(long)]
    allow_oversubscribe: bool,

    /// Engine configuration file
    #[arg(short, long, default_value = "topoforge.yaml")]
    config: PathBuf,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,
}

impl Args {
    /// Validate the raw arguments into typed synthesis parameters. The
    /// core trusts these; everything user-facing is checked here.
    fn to_params(&self) -> Result<SynthesisParams, TopoError> {
        if !render::template_exists(&self.template) {
            return Err(TopoError::Configuration(format!(
                "template does not exist: {}",
                self.template
            )));
        }
        if self.dmvpn_security == SecurityMode::Psk && self.dmvpn_psk.is_none() {
            return Err(TopoError::Configuration(
                "--dmvpn-security psk requires --dmvpn-psk".to_string(),
            ));
        }

        let device = self.device_template.unwrap_or(if self.template.starts_with("csr") {
            DeviceFamily::Csr1000v
        } else {
            DeviceFamily::Iosv
        });

        let mgmt = self.mgmt.then(|| MgmtOptions {
            cidr: self.mgmt_cidr,
            slot: self.mgmt_slot,
            vrf: self.mgmt_vrf.clone(),
            gateway: self.mgmt_gw,
        });
        let ntp = self.ntp.as_ref().map(|server| NtpOptions {
            server: server.clone(),
            vrf: self.ntp_vrf.clone(),
        });
        let dmvpn = (self.mode == Mode::Dmvpn).then(|| DmvpnOptions {
            nbma_cidr: self.dmvpn_nbma_cidr,
            tunnel_cidr: self.dmvpn_tunnel_cidr,
            underlay: self.dmvpn_underlay,
            phase: self.dmvpn_phase,
            routing: self.dmvpn_routing,
            security: self.dmvpn_security,
            psk: self.dmvpn_psk.clone(),
            tunnel_key: self.dmvpn_tunnel_key,
            hubs: self.dmvpn_hubs.clone(),
            eigrp_stub: self.dmvpn_eigrp_stub,
        });

        Ok(SynthesisParams {
            mode: self.mode,
            nodes: self.nodes,
            group_size: self.flat_group_size,
            distance: self.distance,
            title: self.labname.clone(),
            template: self.template.clone(),
            device,
            schema_version: self.schema_version.clone(),
            loopback_255: self.loopback_255,
            gi0_zero: self.gi0_zero,
            pair_vrf: self.pair_vrf.clone(),
            mgmt,
            ntp,
            dmvpn,
            allow_oversubscribe: self.allow_oversubscribe,
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::load(&args.config);
    if args.write_config {
        config.save(&args.config)?;
        info!("configuration written to {}", args.config.display());
        return Ok(());
    }

    let params = args.to_params()?;
    info!("synthesizing: {}", params.summary());

    let topo = builder::build(&params, &config, chrono::Utc::now())?;
    info!("{} nodes, {} links", topo.nodes.len(), topo.links.len());

    let mut emitter = OfflineEmitter::new(&args.output, args.overwrite);
    emitter.emit(&topo)?;
    Ok(())
}
