use async_trait::async_trait;
use brewlet_core::{AgentConfig, SettingsStore};
use brewlet_error::{BrewletError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

const SETTINGS_DIR: &str = "brewlet";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub settings_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsEntry {
    settings: AgentConfig,
    saved_at: i64,
}

/// 以 JSON 文件保存配置
pub struct FileSettingsStore {
    settings_dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new() -> Result<Self> {
        Self::new_with_config(StoreConfig::default())
    }

    pub fn new_with_config(config: StoreConfig) -> Result<Self> {
        let settings_dir = match config.settings_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .ok_or_else(|| BrewletError::Config {
                    message: "无法获取配置目录".to_string(),
                })?
                .join(SETTINGS_DIR),
        };

        Ok(Self { settings_dir })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_dir.join(SETTINGS_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.settings_dir)
            .await
            .map_err(|e| BrewletError::file_io(&self.settings_dir, e))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<AgentConfig> {
        let path = self.settings_path();

        if !path.exists() {
            debug!("配置文件不存在，使用默认配置");
            return Ok(AgentConfig::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| BrewletError::file_io(&path, e))?;

        let entry: SettingsEntry =
            serde_json::from_str(&content).map_err(|e| BrewletError::Config {
                message: format!("解析配置失败: {}", e),
            })?;

        debug!("已读取配置: {}", path.display());
        Ok(entry.settings)
    }

    async fn save(&self, config: &AgentConfig) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.settings_path();
        let entry = SettingsEntry {
            settings: config.clone(),
            saved_at: chrono::Utc::now().timestamp(),
        };

        let content = serde_json::to_string_pretty(&entry).map_err(|e| BrewletError::Config {
            message: format!("序列化配置失败: {}", e),
        })?;

        fs::write(&path, content)
            .await
            .map_err(|e| BrewletError::file_io(&path, e))?;

        info!("配置已保存: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &std::path::Path) -> FileSettingsStore {
        FileSettingsStore::new_with_config(StoreConfig {
            settings_dir: Some(dir.join("brewlet")),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_returns_default() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let config = store.load().await.unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let config = AgentConfig {
            update_interval: 600,
            dont_upgrade_casks: true,
            brew_path: Some(PathBuf::from("/opt/homebrew/bin/brew")),
            ..AgentConfig::default()
        };
        store.save(&config).await.unwrap();

        assert!(store.settings_path().exists());
        assert_eq!(store.load().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_file_uses_preference_keys() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        store.save(&AgentConfig::default()).await.unwrap();

        let raw = std::fs::read_to_string(store.settings_path()).unwrap();
        assert!(raw.contains("\"updateInterval\": 3600"));
        assert!(raw.contains("\"savedAt\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_config_error() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join("brewlet")).unwrap();
        std::fs::write(store.settings_path(), "not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, BrewletError::Config { .. }));
    }
}
