//! Engine configuration loading and defaults management.
//!
//! The configuration file holds the address pools the allocator draws
//! from, plus the DNS/credential defaults that end up in rendered
//! device configurations. A missing file falls back to defaults; a
//! malformed file is reported and also falls back to defaults so a
//! broken config never blocks synthesis silently.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Topology generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pool carved into /32 loopback addresses.
    pub loopbacks: Ipv4Network,
    /// Pool carved into /30 point-to-point networks.
    pub p2pnets: Ipv4Network,
    /// Nameserver pushed into rendered configurations. Overwritten with
    /// the shared-services host address in modes that create one.
    pub nameserver: String,
    /// Domain name for generated routers.
    pub domainname: String,
    /// Login username baked into router configurations.
    pub username: String,
    /// Login password baked into router configurations.
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            loopbacks: "10.0.0.0/8".parse().expect("static CIDR"),
            p2pnets: "172.16.0.0/12".parse().expect("static CIDR"),
            nameserver: "8.8.8.8".to_string(),
            domainname: "virl.lab".to_string(),
            username: "cisco".to_string(),
            password: "cisco".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration from the given file, falling back to
    /// defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Config {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(cfg) => {
                    log::info!("Configuration loaded from file {}", path.display());
                    cfg
                }
                Err(err) => {
                    log::error!("{}", err);
                    log::warn!("using configuration defaults");
                    Config::default()
                }
            },
            Err(_) => {
                log::warn!("using configuration defaults");
                Config::default()
            }
        }
    }

    /// Save the current configuration to the given file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_yaml::to_string(self).expect("config serializes");
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.domainname, "virl.lab");
        assert_eq!(cfg.loopbacks.prefix(), 8);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "loopbacks: 10.100.0.0/16").unwrap();
        writeln!(file, "domainname: example.lab").unwrap();
        let cfg = Config::load(file.path());
        assert_eq!(cfg.loopbacks, "10.100.0.0/16".parse().unwrap());
        assert_eq!(cfg.domainname, "example.lab");
        assert_eq!(cfg.username, "cisco");
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "loopbacks: [not, a, cidr]").unwrap();
        let cfg = Config::load(file.path());
        assert_eq!(cfg.p2pnets, "172.16.0.0/12".parse().unwrap());
    }
}
