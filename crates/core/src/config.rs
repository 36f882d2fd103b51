use crate::package::InclusionPolicy;
use crate::scheduler::DEFAULT_PERIOD;
use async_trait::async_trait;
use brewlet_error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

fn default_update_interval() -> i64 {
    DEFAULT_PERIOD.as_secs() as i64
}

/// 由展示层提供的配置，键名与偏好设置保持一致
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// 秒；-1 表示从不检查，0 表示使用默认值
    #[serde(default = "default_update_interval")]
    pub update_interval: i64,
    #[serde(default)]
    pub include_dependencies: bool,
    #[serde(default)]
    pub auto_upgrade: bool,
    #[serde(default)]
    pub dont_notify: bool,
    #[serde(default)]
    pub dont_upgrade_casks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brew_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            include_dependencies: false,
            auto_upgrade: false,
            dont_notify: false,
            dont_upgrade_casks: false,
            brew_path: None,
        }
    }
}

impl AgentConfig {
    pub fn policy(&self) -> InclusionPolicy {
        InclusionPolicy::new(self.include_dependencies)
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<AgentConfig>;

    async fn save(&self, config: &AgentConfig) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemorySettings {
    config: Mutex<AgentConfig>,
}

impl InMemorySettings {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn load(&self) -> Result<AgentConfig> {
        Ok(self.config.lock().await.clone())
    }

    async fn save(&self, config: &AgentConfig) -> Result<()> {
        *self.config.lock().await = config.clone();
        Ok(())
    }
}
