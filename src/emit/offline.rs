//! Offline emitter: serialize the topology into a declarative lab
//! document the controller can import.

use std::fmt::Write;
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, TopoError};
use crate::model::{InterfaceKind, NodeSpec, TopologySpec};

use super::{interface_label, Emitter};

/// Writes the lab document to a file. Refuses to replace an existing
/// file unless overwriting was requested.
#[derive(Debug)]
pub struct OfflineEmitter {
    path: PathBuf,
    overwrite: bool,
}

impl OfflineEmitter {
    pub fn new(path: impl Into<PathBuf>, overwrite: bool) -> OfflineEmitter {
        OfflineEmitter {
            path: path.into(),
            overwrite,
        }
    }
}

impl Emitter for OfflineEmitter {
    fn emit(&mut self, topo: &TopologySpec) -> Result<()> {
        if self.path.exists() {
            if !self.overwrite {
                return Err(TopoError::OutputConflict(self.path.clone()));
            }
            log::warn!("overwriting existing file {}", self.path.display());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let document = render_document(topo);
        fs::write(&self.path, document)?;
        log::info!("lab document written to {}", self.path.display());
        Ok(())
    }
}

fn node_block(out: &mut String, node: &NodeSpec, id: usize) {
    let _ = writeln!(out, "  - id: n{id}");
    let _ = writeln!(out, "    label: {}", node.hostname);
    let _ = writeln!(out, "    node_definition: {}", node.definition);
    if node.hide_links {
        out.push_str("    hide_links: true\n");
    }
    let _ = writeln!(out, "    x: {}", node.position.x);
    let _ = writeln!(out, "    y: {}", node.position.y);

    let physical: Vec<_> = node
        .interfaces
        .iter()
        .filter(|i| i.kind == InterfaceKind::Physical)
        .collect();
    if !physical.is_empty() {
        out.push_str("    interfaces:\n");
        for iface in physical {
            let _ = writeln!(out, "      - id: i{}", iface.slot);
            let _ = writeln!(out, "        slot: {}", iface.slot);
            let _ = writeln!(out, "        label: {}", interface_label(node, iface.slot));
            out.push_str("        type: physical\n");
        }
    }

    if let Some(cfg) = &node.configuration {
        out.push_str("    configuration: |-\n");
        for line in cfg.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "      {line}");
            }
        }
    }
}

/// Render the whole document. Pure; the emitter only adds the
/// filesystem handling around it.
pub fn render_document(topo: &TopologySpec) -> String {
    let mut out = String::new();
    out.push_str("lab:\n");
    let _ = writeln!(out, "  title: {}", topo.title);
    // Quoted so ':' and '|' inside never break parsing.
    let _ = writeln!(out, "  description: \"{}\"", topo.description);
    // The parameter restatement rides along for later audit tooling.
    out.push_str("  notes: |-\n");
    let _ = writeln!(out, "    {}", topo.notes);
    let _ = writeln!(out, "  version: '{}'", topo.schema_version);

    out.push_str("nodes:\n");
    for (id, node) in topo.nodes.iter().enumerate() {
        node_block(&mut out, node, id);
    }

    out.push_str("links:\n");
    for (lid, link) in topo.links.iter().enumerate() {
        let _ = writeln!(out, "  - id: l{lid}");
        let _ = writeln!(out, "    n1: n{}", link.a_node);
        let _ = writeln!(out, "    i1: i{}", link.a_slot);
        let _ = writeln!(out, "    n2: n{}", link.b_node);
        let _ = writeln!(out, "    i2: i{}", link.b_slot);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::builder::testutil;
    use crate::config::Config;
    use crate::params::Mode;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn flat_topology() -> TopologySpec {
        let params = testutil::params(Mode::Flat, 3);
        let config = Config::default();
        let ts = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        builder::build(&params, &config, ts).unwrap()
    }

    #[test]
    fn test_refuses_to_overwrite_without_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lab.yaml");
        std::fs::write(&path, "existing").unwrap();

        let topo = flat_topology();
        let mut emitter = OfflineEmitter::new(&path, false);
        let err = emitter.emit(&topo).unwrap_err();
        assert!(matches!(err, TopoError::OutputConflict(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");

        let mut emitter = OfflineEmitter::new(&path, true);
        emitter.emit(&topo).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("lab:"));
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep/nested/lab.yaml");
        let mut emitter = OfflineEmitter::new(&path, false);
        emitter.emit(&flat_topology()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_document_structure() {
        let topo = flat_topology();
        let doc = render_document(&topo);

        assert!(doc.starts_with("lab:\n  title: testlab\n"));
        assert!(doc.contains("  version: '0.3.0'\n"));
        assert!(doc.contains("description: \"Generated by topoforge v"));
        // parameter restatement is machine-readable JSON
        let notes_line = doc
            .lines()
            .skip_while(|l| *l != "  notes: |-")
            .nth(1)
            .unwrap();
        let notes: serde_json::Value = serde_json::from_str(notes_line.trim()).unwrap();
        assert_eq!(notes["mode"], "flat");
        assert_eq!(notes["nodes"], 3);

        // core switch first, ports labelled by slot
        assert!(doc.contains("  - id: n0\n    label: SW0\n"));
        assert!(doc.contains("        label: port0\n"));
        // routers carry their configuration as a block literal
        assert!(doc.contains("    configuration: |-\n      hostname R1\n"));
        assert!(doc.contains("        label: GigabitEthernet0/0\n"));
        // links reference node and interface identifiers
        assert!(doc.contains("links:\n  - id: l0\n"));
    }

    #[test]
    fn test_document_is_valid_yaml() {
        let doc = render_document(&flat_topology());
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(parsed["lab"]["title"], "testlab");
        let nodes = parsed["nodes"].as_sequence().unwrap();
        assert_eq!(nodes.len(), 5);
        let links = parsed["links"].as_sequence().unwrap();
        assert_eq!(links.len(), 4);
    }

    #[test]
    fn test_emission_is_deterministic() {
        let params = testutil::params(Mode::Flat, 4);
        let config = Config::default();
        let ts = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        let a = render_document(&builder::build(&params, &config, ts).unwrap());
        let b = render_document(&builder::build(&params, &config, ts).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_tunnel_interfaces_stay_out_of_the_document() {
        use crate::params::{
            DmvpnOptions, DmvpnRouting, DmvpnUnderlay, SecurityMode,
        };
        let mut params = testutil::params(Mode::Dmvpn, 4);
        params.template = "iosv-dmvpn".to_string();
        params.dmvpn = Some(DmvpnOptions {
            nbma_cidr: "10.10.0.0/16".parse().unwrap(),
            tunnel_cidr: "172.20.0.0/16".parse().unwrap(),
            underlay: DmvpnUnderlay::Flat,
            phase: 2,
            routing: DmvpnRouting::Eigrp,
            security: SecurityMode::None,
            psk: None,
            tunnel_key: 10,
            hubs: vec![1],
            eigrp_stub: false,
        });
        let config = Config::default();
        let ts = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        let topo = builder::build(&params, &config, ts).unwrap();
        let doc = render_document(&topo);
        assert!(!doc.contains("id: i1000"));
        assert!(doc.contains("interface Tunnel0"));
    }
}
