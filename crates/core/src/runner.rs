use brewlet_error::{BrewletError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// stdout 与 stderr 合并收集到内存
    Capture,
    /// stdout 与 stderr 追加写入文件，完成后输出为空
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub sink: OutputSink,
}

impl CommandRequest {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            sink: OutputSink::Capture,
        }
    }

    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// 被信号终止时为 None
    pub exit_code: Option<i32>,
    pub output: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).to_string()
    }

    /// 非零退出转换为 NonZeroExit 错误
    pub fn require_success(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(BrewletError::NonZeroExit {
                command: command.to_string(),
                exit_code: self.exit_code.unwrap_or(-1),
            })
        }
    }
}

/// 进程完成时恰好送达一次的结果
pub type PendingOutput = oneshot::Receiver<Result<ProcessOutput>>;

pub trait CommandRunner: Send + Sync {
    /// 立即返回，进程在后台运行
    fn run(&self, request: CommandRequest) -> PendingOutput;
}

/// 基于 tokio::process 的实现，必须在 tokio 运行时内调用
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, request: CommandRequest) -> PendingOutput {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = execute(request).await;
            if tx.send(result).is_err() {
                debug!("命令结果无人接收");
            }
        });
        rx
    }
}

async fn execute(request: CommandRequest) -> Result<ProcessOutput> {
    let command = request.to_string();
    debug!("执行命令: {}", command);

    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args).stdin(Stdio::null());

    let result = match &request.sink {
        OutputSink::Capture => capture(cmd, &command).await,
        OutputSink::File(path) => redirect(cmd, &command, path).await,
    };

    match &result {
        Ok(output) => debug!("命令结束: {} (退出码: {:?})", command, output.exit_code),
        Err(err) => warn!("命令失败: {}", err),
    }
    result
}

async fn capture(mut cmd: Command, command: &str) -> Result<ProcessOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| BrewletError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut output = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    // 两个流交错写入同一个缓冲区
    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => {
                if !absorb(command, "stdout", read, &out_buf, &mut output) {
                    stdout = None;
                }
            }
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => {
                if !absorb(command, "stderr", read, &err_buf, &mut output) {
                    stderr = None;
                }
            }
        }
    }

    let status = child.wait().await?;
    Ok(ProcessOutput {
        exit_code: status.code(),
        output,
    })
}

/// 返回该流是否仍可继续读取
fn absorb(
    command: &str,
    stream: &str,
    read: std::io::Result<usize>,
    chunk: &[u8],
    output: &mut Vec<u8>,
) -> bool {
    match read {
        Ok(0) => false,
        Ok(n) => {
            output.extend_from_slice(&chunk[..n]);
            true
        }
        Err(err) => {
            warn!("读取 {} 的 {} 失败，输出可能不完整: {}", command, stream, err);
            false
        }
    }
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

async fn redirect(mut cmd: Command, command: &str, path: &Path) -> Result<ProcessOutput> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BrewletError::file_io(parent, e))?;
    }

    let log = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| BrewletError::file_io(path, e))?
        .into_std()
        .await;
    let stdout = log.try_clone().map_err(|e| BrewletError::file_io(path, e))?;
    let stderr = log.try_clone().map_err(|e| BrewletError::file_io(path, e))?;

    cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
    let spawned = cmd.spawn();
    // 子进程已持有自己的句柄
    drop(cmd);
    let mut child = spawned.map_err(|source| BrewletError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let status = child.wait().await?;

    let log = tokio::fs::File::from_std(log);
    if let Err(err) = log.sync_all().await {
        warn!("同步命令日志失败: {}: {}", path.display(), err);
    }
    drop(log);

    Ok(ProcessOutput {
        exit_code: status.code(),
        output: Vec::new(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> CommandRequest {
        CommandRequest::new("/bin/sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_capture_combines_streams() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(sh("echo out; echo err 1>&2"))
            .await
            .unwrap()
            .unwrap();

        assert!(output.success());
        let text = output.text();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_delivered() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(sh("echo broken; exit 3"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.text(), "broken\n");
        let err = output.require_success("sh").unwrap_err();
        assert!(matches!(err, BrewletError::NonZeroExit { exit_code: 3, .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(CommandRequest::new("/nonexistent/brew", ["info"]))
            .await
            .unwrap();

        assert!(matches!(result, Err(BrewletError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_file_sink_creates_parent_and_file() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("logs").join("commands.log");

        let runner = ProcessRunner::new();
        let output = runner
            .run(sh("true").with_sink(OutputSink::File(log_path.clone())))
            .await
            .unwrap()
            .unwrap();

        assert!(output.success());
        assert!(output.output.is_empty());
        assert!(log_path.exists());
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
    }

    #[tokio::test]
    async fn test_file_sink_appends_both_streams() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("commands.log");
        let runner = ProcessRunner::new();

        for script in ["echo first", "echo second 1>&2"] {
            runner
                .run(sh(script).with_sink(OutputSink::File(log_path.clone())))
                .await
                .unwrap()
                .unwrap();
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_read_error_closes_stream_and_keeps_output() {
        let mut output = b"partial".to_vec();

        assert!(absorb("sh", "stdout", Ok(3), b"abcdef", &mut output));
        assert_eq!(output, b"partialabc");

        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        assert!(!absorb("sh", "stderr", Err(err), b"xyz", &mut output));
        assert!(!absorb("sh", "stdout", Ok(0), b"xyz", &mut output));
        assert_eq!(output, b"partialabc");
    }

    #[test]
    fn test_request_display() {
        let request = CommandRequest::new("/opt/homebrew/bin/brew", ["info", "--json=v2"]);
        assert_eq!(request.to_string(), "/opt/homebrew/bin/brew info --json=v2");
    }
}
