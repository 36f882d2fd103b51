use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_DIR_NAME: &str = "Brewlet";
const LOG_FILE_PREFIX: &str = "brewlet-";
const LOG_FILE_SUFFIX: &str = ".jsonl";
const COMMAND_LOG_PREFIX: &str = "commands-";
const COMMAND_LOG_SUFFIX: &str = ".log";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const RETENTION_DAYS: i64 = 7;
const MAX_LOG_LINES: usize = 2000;

/// 终端输出人类可读日志，同时写入按天滚动的 JSON 日志
pub fn init_logging(verbose: bool) -> Result<PathBuf> {
    let log_dir = resolve_log_dir()?;
    ensure_dir(&log_dir)?;
    cleanup_old_logs(&log_dir)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let writer_dir = log_dir.clone();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_writer(move || JsonLogWriter::new(writer_dir.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("初始化日志失败: {}", e))?;

    Ok(log_dir)
}

/// 最新的日志在前
pub fn read_logs(log_dir: &Path) -> Result<Vec<String>> {
    if !log_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = collect_log_files(log_dir, LOG_FILE_PREFIX, LOG_FILE_SUFFIX)?;
    files.sort_by(|a, b| b.0.cmp(&a.0));

    let mut lines = Vec::new();
    for (_, path) in files {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取日志失败: {}", path.display()))?;
        for line in content.lines().rev() {
            if line.trim().is_empty() {
                continue;
            }
            lines.push(line.to_string());
            if lines.len() >= MAX_LOG_LINES {
                return Ok(lines);
            }
        }
    }

    Ok(lines)
}

/// 长时间运行命令的输出文件
pub fn command_log_path(log_dir: &Path) -> PathBuf {
    dated_file(log_dir, COMMAND_LOG_PREFIX, COMMAND_LOG_SUFFIX)
}

#[derive(Clone)]
struct JsonLogWriter {
    log_dir: PathBuf,
}

impl JsonLogWriter {
    fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }
}

impl Write for JsonLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Err(err) = append_line_bytes(&self.log_dir, buf) {
            eprintln!("写入日志失败: {}", err);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn resolve_log_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join("Library").join("Logs").join(LOG_DIR_NAME));
    }
    if let Some(cache) = dirs::cache_dir() {
        return Ok(cache.join(LOG_DIR_NAME).join("Logs"));
    }
    Err(anyhow!("无法解析日志目录"))
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("创建日志目录失败: {}", path.display()))
}

fn append_line_bytes(log_dir: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let path = dated_file(log_dir, LOG_FILE_PREFIX, LOG_FILE_SUFFIX);
    if let Ok(metadata) = fs::metadata(&path) {
        if metadata.len() >= MAX_LOG_BYTES {
            return Ok(());
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(bytes)
}

fn dated_file(log_dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{}{}{}", prefix, date, suffix))
}

fn collect_log_files(log_dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(log_dir).context("读取日志目录失败")?;
    for entry in entries {
        let path = entry.context("读取日志条目失败")?.path();
        if let Some(date) = parse_log_date(&path, prefix, suffix) {
            files.push((date, path));
        }
    }
    Ok(files)
}

fn parse_log_date(path: &Path, prefix: &str, suffix: &str) -> Option<NaiveDate> {
    let file_name = path.file_name()?.to_string_lossy();
    let date_str = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
}

fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let cutoff = Local::now().date_naive() - Duration::days(RETENTION_DAYS);
    for (prefix, suffix) in [
        (LOG_FILE_PREFIX, LOG_FILE_SUFFIX),
        (COMMAND_LOG_PREFIX, COMMAND_LOG_SUFFIX),
    ] {
        for (date, path) in collect_log_files(log_dir, prefix, suffix)? {
            if date < cutoff {
                if let Err(err) = fs::remove_file(&path) {
                    debug!("删除过期日志失败: {}: {}", path.display(), err);
                }
            }
        }
    }

    Ok(())
}
