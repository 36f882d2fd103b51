use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrewletError {
    #[error("无法启动命令: '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("命令执行失败: '{command}' (退出码: {exit_code})")]
    NonZeroExit { command: String, exit_code: i32 },

    #[error("解析 {context} 失败: {message}")]
    Parse { context: String, message: String },

    #[error("文件读写失败: {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("配置错误: {message}")]
    Config { message: String },

    #[error("通道已关闭: {0}")]
    ChannelClosed(&'static str),

    #[error("IO错误")]
    Io(#[from] io::Error),
}

impl BrewletError {
    /// 供展示层使用的错误分类标签
    pub fn context(&self) -> &'static str {
        match self {
            BrewletError::Spawn { .. } => "spawn",
            BrewletError::NonZeroExit { .. } => "exit",
            BrewletError::Parse { .. } => "parse",
            BrewletError::FileIo { .. } => "file",
            BrewletError::Config { .. } => "config",
            BrewletError::ChannelClosed(_) => "channel",
            BrewletError::Io(_) => "io",
        }
    }

    pub fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        BrewletError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn file_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BrewletError::FileIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BrewletError>;
