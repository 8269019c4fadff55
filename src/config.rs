use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use anyhow::{Context, Result};
use crate::protocol::flow_table::ETH_TYPE_IPV4;

pub const DEFAULT_CONTROL_PORT: u16 = 2089;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub control_bind: IpAddr,
    pub control_port: u16,
    pub rule_priority: u16,
    pub eth_type: u16,
    pub log_snapshots: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control_bind: IpAddr::from([127, 0, 0, 1]),
            control_port: DEFAULT_CONTROL_PORT,
            rule_priority: 0,
            eth_type: ETH_TYPE_IPV4,
            log_snapshots: true,
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ControllerConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_fields_take_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"control_port": 7000, "log_snapshots": false}}"#).unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.control_port, 7000);
        assert!(!config.log_snapshots);
        assert_eq!(config.eth_type, ETH_TYPE_IPV4);
        assert_eq!(config.rule_priority, 0);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        let config = ControllerConfig {
            rule_priority: 10,
            ..ControllerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ControllerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unwritable_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("controller.json");
        let err = ControllerConfig::default().save(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn unreadable_config_reports_path() {
        let err = ControllerConfig::load("/nonexistent/controller.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/controller.json"));
    }
}
