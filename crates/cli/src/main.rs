use anyhow::{anyhow, bail, Context, Result};
use brewlet_brew::{Brew, BrewCommand, InfoSchema};
use brewlet_cli::display::{render_decision, render_event, render_services};
use brewlet_cli::export::{default_export_dir, write_package_list};
use brewlet_cli::logging;
use brewlet_cli::{Agent, AgentPaths};
use brewlet_core::services::compute_bulk_action;
use brewlet_core::{
    reconcile, AgentConfig, AgentEvent, ProcessRunner, ServiceAction, ServiceTarget,
    ServiceVerb, SettingsStore, Snapshot, UpdateInterval,
};
use brewlet_store::FileSettingsStore;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "brewlet", version = env!("CARGO_PKG_VERSION"), about = "Homebrew 状态后台代理")]
struct Cli {
    #[arg(short, long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// 覆盖配置中的 brew 路径
    #[arg(long, global = true)]
    brew: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动后台代理，定时检查并输出事件
    Run,
    /// 检查一次过期包
    Check {
        /// 依赖包也计入过期数量
        #[arg(long)]
        include_dependencies: bool,
        /// 使用旧版 `--json` 输出格式
        #[arg(long)]
        legacy: bool,
    },
    /// 旧版 `outdated -v` 文本列表
    Outdated,
    /// 导出已安装包列表
    Export {
        /// 导出目录，默认为下载目录
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// 查看或控制 brew 服务
    Services {
        #[command(subcommand)]
        action: Option<ServiceCommand>,
    },
    /// 设置检查周期（秒）；-1 表示从不检查，0 表示默认值
    Interval {
        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },
    /// 查看或切换 brew 统计分析
    Analytics { state: Option<Switch> },
    /// 查看最近的日志
    Logs {
        /// 只输出日志目录
        #[arg(long)]
        path: bool,
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceCommand {
    List,
    Start(ServiceTargetArgs),
    Stop(ServiceTargetArgs),
    Restart(ServiceTargetArgs),
}

#[derive(clap::Args, Debug)]
struct ServiceTargetArgs {
    /// 服务名
    name: Option<String>,
    /// 作用于所有服务
    #[arg(long, conflicts_with = "name")]
    all: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match logging::init_logging(cli.verbose) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("初始化日志失败: {}", err);
            logging::resolve_log_dir().unwrap_or_else(|_| std::env::temp_dir())
        }
    };

    let store = Arc::new(FileSettingsStore::new().context("创建配置存储失败")?);
    let mut config = store.load().await.context("读取配置失败")?;
    if let Some(path) = cli.brew.clone() {
        config.brew_path = Some(path);
    }
    let brew = Brew::new(config.brew_path.clone(), Arc::new(ProcessRunner::new()));

    match cli.command {
        Commands::Run => cmd_run(store, config, log_dir, cli.json).await,
        Commands::Check {
            include_dependencies,
            legacy,
        } => {
            if include_dependencies {
                config.include_dependencies = true;
            }
            cmd_check(&brew, &config, legacy, cli.json).await
        }
        Commands::Outdated => cmd_outdated(&brew, cli.json).await,
        Commands::Export { dir } => cmd_export(&brew, dir).await,
        Commands::Services { action } => cmd_services(&brew, action, cli.json).await,
        Commands::Interval { seconds } => cmd_interval(store.as_ref(), config, seconds).await,
        Commands::Analytics { state } => cmd_analytics(&brew, state, cli.json).await,
        Commands::Logs { path, lines } => cmd_logs(&log_dir, path, lines),
    }
}

async fn run_with_timeout<F>(message: &'static str, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    timeout(COMMAND_TIMEOUT, fut)
        .await
        .map_err(|_| anyhow!(message))?
}

fn print_event(event: &AgentEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    if let Some(lines) = render_event(event) {
        for line in lines {
            if matches!(event, AgentEvent::Error { .. }) {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

async fn cmd_run(
    store: Arc<FileSettingsStore>,
    config: AgentConfig,
    log_dir: PathBuf,
    json: bool,
) -> Result<()> {
    let export_dir = default_export_dir().ok_or_else(|| anyhow!("无法解析下载目录"))?;
    let paths = AgentPaths { log_dir, export_dir };
    let (agent, handle, mut events) =
        Agent::new(Arc::new(ProcessRunner::new()), store.clone(), config, paths);
    let agent_task = tokio::spawn(agent.run());
    let mut reload = ReloadSignal::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event, json)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown()?;
                break;
            }
            _ = reload.recv() => {
                match store.load().await {
                    Ok(config) => handle.on_config_changed(config)?,
                    Err(err) => eprintln!("{}", format!("错误: 重新读取配置失败: {}", err).bright_red()),
                }
            }
        }
    }

    agent_task.await.context("代理任务异常退出")??;
    Ok(())
}

/// SIGHUP 触发重新读取配置
struct ReloadSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl ReloadSignal {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Self {
                inner: signal(SignalKind::hangup()).ok(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.inner.as_mut() {
                if signal.recv().await.is_some() {
                    return;
                }
                self.inner = None;
            }
        }
        std::future::pending::<()>().await
    }
}

async fn cmd_check(brew: &Brew, config: &AgentConfig, legacy: bool, json: bool) -> Result<()> {
    run_with_timeout("检查操作超时", async {
        let schema = if legacy { InfoSchema::V1 } else { InfoSchema::V2 };
        let snapshot = brew
            .installed_snapshot(schema)
            .await
            .context("获取已安装包失败")?;
        let decision = reconcile(&Snapshot::default(), &snapshot, &config.policy());

        if json {
            println!("{}", serde_json::to_string_pretty(&decision)?);
        } else {
            println!("已安装包: {}", snapshot.len());
            for line in render_decision(&decision) {
                println!("{}", line);
            }
        }
        Ok(())
    })
    .await
}

async fn cmd_outdated(brew: &Brew, json: bool) -> Result<()> {
    run_with_timeout("检查操作超时", async {
        let lines = brew.outdated_lines().await.context("获取过期列表失败")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&lines)?);
        } else if lines.is_empty() {
            println!("{}", "✓ 所有包均为最新".bright_green());
        } else {
            println!("{}", format!("{} 个过期包", lines.len()).bright_yellow());
            for line in lines {
                println!("  {} {}", "→".bright_blue(), line);
            }
        }
        Ok(())
    })
    .await
}

async fn cmd_export(brew: &Brew, dir: Option<PathBuf>) -> Result<()> {
    run_with_timeout("导出操作超时", async {
        let dir = match dir {
            Some(dir) => dir,
            None => default_export_dir().ok_or_else(|| anyhow!("无法解析下载目录"))?,
        };
        let output = brew
            .exec(&BrewCommand::ListNames)
            .await
            .context("获取包列表失败")?;
        let path = write_package_list(&dir, &output.output)
            .await
            .context("写入包列表失败")?;
        println!("{} 已导出到 {}", "✓".bright_green(), path.display());
        Ok(())
    })
    .await
}

fn service_action(verb: ServiceVerb, args: ServiceTargetArgs) -> Result<ServiceAction> {
    if args.all {
        return Ok(compute_bulk_action(verb));
    }
    match args.name {
        Some(name) => Ok(ServiceAction {
            verb,
            target: ServiceTarget::One(name),
        }),
        None => bail!("需要指定服务名或 --all"),
    }
}

async fn cmd_services(brew: &Brew, action: Option<ServiceCommand>, json: bool) -> Result<()> {
    run_with_timeout("服务操作超时", async {
        let action = match action {
            None | Some(ServiceCommand::List) => None,
            Some(ServiceCommand::Start(args)) => Some(service_action(ServiceVerb::Start, args)?),
            Some(ServiceCommand::Stop(args)) => Some(service_action(ServiceVerb::Stop, args)?),
            Some(ServiceCommand::Restart(args)) => {
                Some(service_action(ServiceVerb::Restart, args)?)
            }
        };

        if let Some(action) = action {
            let output = brew
                .exec(&BrewCommand::Service(action))
                .await
                .context("服务操作失败")?;
            let text = output.text();
            if !json && !text.trim().is_empty() {
                println!("{}", text.trim_end());
            }
        }

        let services = brew.services().await.context("获取服务列表失败")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&services)?);
        } else {
            for line in render_services(&services) {
                println!("{}", line);
            }
        }
        Ok(())
    })
    .await
}

async fn cmd_interval(store: &dyn SettingsStore, mut config: AgentConfig, seconds: i64) -> Result<()> {
    config.update_interval = UpdateInterval::normalize(seconds);
    store.save(&config).await.context("保存配置失败")?;

    match UpdateInterval::from_seconds(config.update_interval) {
        UpdateInterval::Never => println!("已关闭定时检查"),
        _ => println!("检查周期: {} 秒", config.update_interval),
    }
    println!("{}", "运行中的代理会在收到 SIGHUP 后重新读取配置".dimmed());
    Ok(())
}

async fn cmd_analytics(brew: &Brew, state: Option<Switch>, json: bool) -> Result<()> {
    run_with_timeout("统计分析操作超时", async {
        if let Some(state) = state {
            brew.exec(&BrewCommand::SetAnalytics(matches!(state, Switch::On)))
                .await
                .context("切换统计分析失败")?;
        }
        let enabled = brew
            .analytics_enabled()
            .await
            .context("读取统计分析状态失败")?;
        if json {
            println!("{}", serde_json::json!({ "enabled": enabled }));
        } else if enabled {
            println!("统计分析: {}", "开启".bright_yellow());
        } else {
            println!("统计分析: {}", "关闭".bright_green());
        }
        Ok(())
    })
    .await
}

fn cmd_logs(log_dir: &Path, path_only: bool, limit: usize) -> Result<()> {
    if path_only {
        println!("{}", log_dir.display());
        return Ok(());
    }
    let lines = logging::read_logs(log_dir)?;
    for line in lines.into_iter().take(limit).collect::<Vec<_>>().into_iter().rev() {
        println!("{}", line);
    }
    Ok(())
}
