pub mod command;
pub mod decode;

pub use command::{default_brew_path, BrewCommand, InfoSchema};
pub use decode::{
    decode_analytics_state, decode_outdated_lines, decode_packages, decode_services,
    decode_summary,
};

use brewlet_core::{
    CommandRequest, CommandRunner, OutputSink, PendingOutput, ProcessOutput, Service, Snapshot,
};
use brewlet_error::{BrewletError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Homebrew 命令行客户端，二进制路径不做预先校验
#[derive(Clone)]
pub struct Brew {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Brew {
    pub fn new(path: Option<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            path: path.unwrap_or_else(default_brew_path),
            runner,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        let path = path.unwrap_or_else(default_brew_path);
        if path != self.path {
            info!("brew 路径已更新: {}", path.display());
            self.path = path;
        }
    }

    pub fn request(&self, command: &BrewCommand, sink: OutputSink) -> CommandRequest {
        CommandRequest::new(&self.path, command.args()).with_sink(sink)
    }

    /// 不等待进程结束
    pub fn spawn(&self, command: &BrewCommand, sink: OutputSink) -> PendingOutput {
        let request = self.request(command, sink);
        debug!("派发 brew 命令: {}", request);
        self.runner.run(request)
    }

    /// 等待命令完成并要求退出码为 0
    pub async fn exec(&self, command: &BrewCommand) -> Result<ProcessOutput> {
        let request = self.request(command, OutputSink::Capture);
        let display = request.to_string();
        let output = self
            .runner
            .run(request)
            .await
            .map_err(|_| BrewletError::ChannelClosed("brew"))??;
        output.require_success(&display)
    }

    pub async fn installed_snapshot(&self, schema: InfoSchema) -> Result<Snapshot> {
        let output = self.exec(&BrewCommand::InstalledInfo(schema)).await?;
        decode_packages(&output.output)
    }

    pub async fn services(&self) -> Result<Vec<Service>> {
        let output = self.exec(&BrewCommand::ServicesList).await?;
        Ok(decode_services(&output.text()))
    }

    pub async fn analytics_enabled(&self) -> Result<bool> {
        let output = self.exec(&BrewCommand::AnalyticsState).await?;
        Ok(decode_analytics_state(&output.text()))
    }

    /// 旧版 `outdated` 不论结果都返回 0，因此不检查退出码
    pub async fn outdated_lines(&self) -> Result<Vec<String>> {
        let command = BrewCommand::Outdated { verbose: true };
        let output = self
            .runner
            .run(self.request(&command, OutputSink::Capture))
            .await
            .map_err(|_| BrewletError::ChannelClosed("brew"))??;
        Ok(decode_outdated_lines(&output.text()))
    }
}
