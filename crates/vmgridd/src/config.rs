//! vmgridd.toml configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vmgrid_proto::{FrameworkId, FrameworkInfo};
use vmgrid_scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub framework: FrameworkConfig,
    pub master: MasterConfig,
    pub scheduler: SchedulerSection,
    pub api: ApiConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub name: String,
    pub user: String,
    pub role: Option<String>,
    pub failover_timeout_secs: f64,
    pub checkpoint: bool,
    /// Registry identity; one framework ID is stored per cluster.
    pub cluster: String,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            name: "vmgrid".to_string(),
            user: "root".to_string(),
            role: None,
            failover_timeout_secs: 7.0 * 24.0 * 3600.0,
            checkpoint: true,
            cluster: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// `host:port` of the resource manager.
    pub address: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5050".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub refuse_seconds: f64,
    /// Per-call deadline, e.g. `"10s"` or `"500ms"`.
    pub call_timeout: String,
    pub decline_refuse_seconds: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            refuse_seconds: defaults.refuse_seconds,
            call_timeout: "10s".to_string(),
            decline_refuse_seconds: defaults.decline_refuse_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9999)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/vmgrid"),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given and present; otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => {
                Self::from_file(p).with_context(|| format!("loading config {}", p.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        let call_timeout = parse_duration(&self.scheduler.call_timeout)
            .with_context(|| format!("invalid call_timeout {:?}", self.scheduler.call_timeout))?;
        Ok(SchedulerConfig {
            refuse_seconds: self.scheduler.refuse_seconds,
            call_timeout,
            decline_refuse_seconds: self.scheduler.decline_refuse_seconds,
        })
    }

    /// Framework descriptor for SUBSCRIBE, reusing `id` on re-registration.
    pub fn framework_info(&self, id: Option<FrameworkId>) -> FrameworkInfo {
        FrameworkInfo {
            user: self.framework.user.clone(),
            name: self.framework.name.clone(),
            id,
            failover_timeout: Some(self.framework.failover_timeout_secs),
            checkpoint: Some(self.framework.checkpoint),
            role: self.framework.role.clone(),
            ..Default::default()
        }
    }
}

/// Parse `"10s"`, `"500ms"`, `"2m"` or a bare number of seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
