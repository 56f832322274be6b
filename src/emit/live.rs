//! Live emitter: realize the topology on a controller through a
//! [`ControllerClient`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{InterfaceKind, TopologySpec};

use super::{interface_label, ControllerClient, Emitter};

/// Drives the controller call by call. The first failed call aborts the
/// run; nothing created so far is rolled back, the partial lab stays on
/// the controller for inspection.
pub struct LiveEmitter<C: ControllerClient + 'static> {
    client: Arc<C>,
    /// Export the created lab to this file. Best-effort; a failed
    /// export is logged but never fails the emission.
    export: Option<PathBuf>,
    /// Start the lab once everything is created. Startup runs detached;
    /// a startup failure is logged but never fails the emission.
    start: bool,
}

impl<C: ControllerClient + 'static> LiveEmitter<C> {
    pub fn new(client: Arc<C>, export: Option<PathBuf>, start: bool) -> LiveEmitter<C> {
        LiveEmitter {
            client,
            export,
            start,
        }
    }

    fn export_to_file(&self, lab: &str, path: &PathBuf) {
        match self.client.export_lab(lab) {
            Ok(content) => match std::fs::write(path, content) {
                Ok(()) => log::warn!("exported lab to {}", path.display()),
                Err(err) => log::error!("lab export failed: {err}"),
            },
            Err(err) => log::error!("lab export failed: {err}"),
        }
    }
}

impl<C: ControllerClient + 'static> Emitter for LiveEmitter<C> {
    fn emit(&mut self, topo: &TopologySpec) -> Result<()> {
        let lab = self
            .client
            .create_lab(&topo.title, &topo.description, &topo.notes)?;
        log::info!("lab: {lab}");

        let mut iface_ids: HashMap<(usize, u32), String> = HashMap::new();

        for (idx, node) in topo.nodes.iter().enumerate() {
            let node_id = self.client.create_node(&lab, node)?;
            log::info!("node: {}", node.hostname);
            for iface in &node.interfaces {
                if iface.kind != InterfaceKind::Physical {
                    continue;
                }
                let label = interface_label(node, iface.slot);
                let iface_id =
                    self.client
                        .create_interface(&lab, &node_id, &label, iface.slot)?;
                iface_ids.insert((idx, iface.slot), iface_id);
            }
            if let Some(cfg) = &node.configuration {
                self.client.assign_configuration(&lab, &node_id, cfg)?;
            }
        }

        for link in &topo.links {
            // Both interfaces were created in the node loop above.
            let a = &iface_ids[&(link.a_node, link.a_slot)];
            let b = &iface_ids[&(link.b_node, link.b_slot)];
            self.client.create_link(&lab, a, b)?;
        }

        if let Some(path) = &self.export {
            self.export_to_file(&lab, path);
        }

        if self.start {
            let client = Arc::clone(&self.client);
            std::thread::spawn(move || {
                if let Err(err) = client.start_lab(&lab) {
                    log::error!("lab start failed: {err}");
                }
            });
        }
        Ok(())
    }
}
