use brewlet_error::{BrewletError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const EXPORT_FILE_NAME: &str = "brew-packages.txt";

/// 原样写入 `list -1` 的输出，不追加换行
pub async fn write_package_list(dir: &Path, contents: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| BrewletError::file_io(dir, e))?;

    let path = dir.join(EXPORT_FILE_NAME);
    fs::write(&path, contents)
        .await
        .map_err(|e| BrewletError::file_io(&path, e))?;

    info!("包列表已导出: {}", path.display());
    Ok(path)
}

pub fn default_export_dir() -> Option<PathBuf> {
    dirs::download_dir().or_else(dirs::home_dir)
}
