use crate::export::write_package_list;
use crate::logging::command_log_path;
use brewlet_brew::{decode_analytics_state, decode_packages, decode_services, decode_summary};
use brewlet_brew::{Brew, BrewCommand, InfoSchema};
use brewlet_core::{
    AgentConfig, AgentEvent, CommandKind, CommandRunner, OutputSink, ProcessOutput,
    ReconciliationEngine, Scheduler, ServiceSyncer, ServiceVerb, SettingsStore, SyncGeneration,
    Tick, POLL_SEQUENCE,
};
use brewlet_error::{BrewletError, Result};
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TICK_BUFFER: usize = 4;

#[derive(Debug, Clone)]
pub struct AgentPaths {
    /// 命令日志所在目录
    pub log_dir: PathBuf,
    /// 导出包列表的目录
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    PollAll,
    Poll(CommandKind),
    UpdateUpgrade,
    UpgradePackage(String),
    Cleanup,
    ExportList,
    SetAnalytics(bool),
    ToggleService(String),
    BulkService(ServiceVerb),
    ConfigChanged(AgentConfig),
    Shutdown,
}

/// 展示层向代理发送指令的句柄
#[derive(Debug, Clone)]
pub struct AgentHandle {
    control: mpsc::UnboundedSender<Control>,
}

impl AgentHandle {
    pub fn send(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .map_err(|_| BrewletError::ChannelClosed("agent control"))
    }

    pub fn on_config_changed(&self, config: AgentConfig) -> Result<()> {
        self.send(Control::ConfigChanged(config))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Control::Shutdown)
    }
}

struct Completion {
    command: BrewCommand,
    command_line: String,
    /// 服务列表轮询的同步序号
    sync: Option<SyncGeneration>,
    result: Result<ProcessOutput>,
}

/// 所有共享状态只在 run 循环中修改
pub struct Agent {
    brew: Brew,
    config: AgentConfig,
    settings: Arc<dyn SettingsStore>,
    paths: AgentPaths,
    engine: ReconciliationEngine,
    scheduler: Scheduler,
    services: ServiceSyncer,
    in_flight: HashMap<CommandKind, usize>,
    events: mpsc::UnboundedSender<AgentEvent>,
    ticks: mpsc::Receiver<Tick>,
    control: mpsc::UnboundedReceiver<Control>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl Agent {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: Arc<dyn SettingsStore>,
        config: AgentConfig,
        paths: AgentPaths,
    ) -> (Self, AgentHandle, mpsc::UnboundedReceiver<AgentEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::channel(TICK_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let agent = Self {
            brew: Brew::new(config.brew_path.clone(), runner),
            engine: ReconciliationEngine::new(config.policy()),
            config,
            settings,
            paths,
            scheduler: Scheduler::new(ticks_tx),
            services: ServiceSyncer::new(),
            in_flight: HashMap::new(),
            events: events_tx,
            ticks: ticks_rx,
            control: control_rx,
            completions_tx,
            completions: completions_rx,
        };
        let handle = AgentHandle {
            control: control_tx,
        };

        (agent, handle, events_rx)
    }

    /// 启动定时器并立即轮询一次，直到收到 Shutdown 或句柄全部释放
    pub async fn run(mut self) -> Result<()> {
        info!("Brewlet 代理启动, brew: {}", self.brew.path().display());
        self.apply_period(self.config.update_interval).await;
        self.poll_all();

        loop {
            tokio::select! {
                Some(Tick) = self.ticks.recv() => {
                    debug!("定时检查触发");
                    self.poll_all();
                }
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion).await;
                }
                control = self.control.recv() => match control {
                    Some(Control::Shutdown) | None => break,
                    Some(control) => self.handle_control(control).await,
                },
            }
        }

        // 进行中的命令不会被终止
        self.scheduler.cancel();
        info!("Brewlet 代理已停止");
        Ok(())
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::PollAll => self.poll_all(),
            Control::Poll(kind) => self.poll(kind),
            Control::UpdateUpgrade => {
                self.dispatch(BrewCommand::Update);
            }
            Control::UpgradePackage(name) => {
                self.dispatch(BrewCommand::UpgradePackage(name));
            }
            Control::Cleanup => {
                self.dispatch(BrewCommand::Cleanup);
            }
            Control::ExportList => {
                self.dispatch(BrewCommand::ListNames);
            }
            Control::SetAnalytics(enabled) => {
                self.dispatch(BrewCommand::SetAnalytics(enabled));
            }
            Control::ToggleService(name) => match self.services.toggle(&name) {
                Some(action) => {
                    self.dispatch(BrewCommand::Service(action));
                }
                None => warn!("服务 {} 当前不可操作", name),
            },
            Control::BulkService(verb) => match self.services.bulk(verb) {
                Some(action) => {
                    self.dispatch(BrewCommand::Service(action));
                }
                None => warn!("服务操作进行中，忽略 {} --all", verb),
            },
            Control::ConfigChanged(config) => self.on_config_changed(config).await,
            Control::Shutdown => {}
        }
    }

    async fn on_config_changed(&mut self, config: AgentConfig) {
        let period_changed = config.update_interval != self.config.update_interval;
        self.engine.set_policy(config.policy());
        self.brew.set_path(config.brew_path.clone());
        self.config = config;

        if period_changed {
            self.apply_period(self.config.update_interval).await;
        }
    }

    async fn apply_period(&mut self, seconds: i64) {
        let change = self.scheduler.set_period(seconds);
        let Some(persisted) = change.persist else {
            return;
        };

        info!("更新周期 {} 无效，改用 {} 秒", seconds, persisted);
        self.config.update_interval = persisted;
        if let Err(err) = self.settings.save(&self.config).await {
            error!("保存配置失败: {}", err);
            self.emit(AgentEvent::Error {
                context: "config".to_string(),
                message: err.to_string(),
            });
        }
    }

    fn poll_all(&mut self) {
        for kind in POLL_SEQUENCE {
            self.poll(kind);
        }
    }

    fn poll(&mut self, kind: CommandKind) {
        let command = match kind {
            CommandKind::Packages => BrewCommand::InstalledInfo(InfoSchema::V2),
            CommandKind::Info => BrewCommand::Summary,
            CommandKind::Analytics => BrewCommand::AnalyticsState,
            CommandKind::Services => {
                let generation = self.services.begin_sync();
                self.dispatch_with(BrewCommand::ServicesList, Some(generation));
                return;
            }
            other => {
                warn!("{:?} 不是轮询命令", other);
                return;
            }
        };
        self.dispatch(command);
    }

    fn dispatch(&mut self, command: BrewCommand) -> bool {
        self.dispatch_with(command, None)
    }

    fn dispatch_with(&mut self, command: BrewCommand, sync: Option<SyncGeneration>) -> bool {
        let kind = command.kind();
        if kind.is_mutation() && self.is_in_flight(kind) {
            warn!("{:?} 正在进行中，忽略重复请求", kind);
            return false;
        }

        let sink = if command.is_long_running() {
            OutputSink::File(command_log_path(&self.paths.log_dir))
        } else {
            OutputSink::Capture
        };
        let command_line = format!("brew {}", command.args().join(" "));
        let pending = self.brew.spawn(&command, sink);
        self.mark_started(kind);

        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = match pending.await {
                Ok(result) => result,
                Err(_) => Err(BrewletError::ChannelClosed("process runner")),
            };
            let _ = completions.send(Completion {
                command,
                command_line,
                sync,
                result,
            });
        });
        true
    }

    async fn handle_completion(&mut self, completion: Completion) {
        let Completion {
            command,
            command_line,
            sync,
            result,
        } = completion;
        let kind = command.kind();
        self.mark_finished(kind);

        match command {
            BrewCommand::InstalledInfo(_) => self.on_packages(&command_line, result),
            BrewCommand::Summary => self.on_summary(&command_line, result),
            BrewCommand::AnalyticsState => self.on_analytics(&command_line, result),
            BrewCommand::ServicesList => {
                self.on_services(&command_line, sync.unwrap_or_default(), result)
            }
            BrewCommand::ListNames => self.on_export(&command_line, result).await,
            BrewCommand::Update => {
                self.report_mutation(kind, &command_line, result);
                self.dispatch(BrewCommand::Upgrade {
                    formula_only: self.config.dont_upgrade_casks,
                });
            }
            BrewCommand::Upgrade { .. } | BrewCommand::UpgradePackage(_) => {
                self.report_mutation(kind, &command_line, result);
                self.poll(CommandKind::Packages);
                self.poll(CommandKind::Info);
            }
            BrewCommand::Cleanup => {
                self.report_mutation(kind, &command_line, result);
                self.poll(CommandKind::Info);
            }
            BrewCommand::SetAnalytics(_) => {
                self.report_mutation(kind, &command_line, result);
                self.poll(CommandKind::Analytics);
            }
            BrewCommand::Service(_) => {
                self.report_mutation(kind, &command_line, result);
                self.services.finish_action();
                self.poll(CommandKind::Services);
            }
            BrewCommand::Outdated { .. } => debug!("忽略 {} 的结果", command_line),
        }
    }

    fn on_packages(&mut self, command_line: &str, result: Result<ProcessOutput>) {
        let snapshot = result
            .and_then(|output| output.require_success(command_line))
            .and_then(|output| decode_packages(&output.output));
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // 保留上一次快照
                self.report(CommandKind::Packages, &err);
                return;
            }
        };

        let decision = self.engine.apply(snapshot);
        info!("过期包: {}", decision.count());

        if decision.should_notify() && !self.config.dont_notify {
            self.emit(AgentEvent::Notify {
                count: decision.count(),
                packages: decision.packages().iter().map(|pkg| pkg.name.clone()).collect(),
            });
        }
        let auto_upgrade = self.config.auto_upgrade && decision.should_notify();

        self.emit(AgentEvent::OutdatedCountChanged {
            decision,
            checked_at: Local::now(),
        });

        if auto_upgrade {
            info!("自动升级已开启，开始升级");
            self.dispatch(BrewCommand::Upgrade {
                formula_only: self.config.dont_upgrade_casks,
            });
        }
    }

    fn on_summary(&mut self, command_line: &str, result: Result<ProcessOutput>) {
        match result.and_then(|output| output.require_success(command_line)) {
            Ok(output) => {
                let text = decode_summary(&output.text());
                self.emit(AgentEvent::InfoTextUpdated { text });
            }
            Err(err) => self.report(CommandKind::Info, &err),
        }
    }

    fn on_analytics(&mut self, command_line: &str, result: Result<ProcessOutput>) {
        match result.and_then(|output| output.require_success(command_line)) {
            Ok(output) => {
                let enabled = decode_analytics_state(&output.text());
                self.emit(AgentEvent::AnalyticsStateChanged { enabled });
            }
            Err(err) => self.report(CommandKind::Analytics, &err),
        }
    }

    fn on_services(
        &mut self,
        command_line: &str,
        generation: SyncGeneration,
        result: Result<ProcessOutput>,
    ) {
        match result.and_then(|output| output.require_success(command_line)) {
            Ok(output) => {
                self.services
                    .finish_sync(generation, decode_services(&output.text()));
                let services = self.services.services().to_vec();
                self.emit(AgentEvent::ServicesListUpdated { services });
            }
            Err(err) => {
                self.services.abort_sync(generation);
                self.report(CommandKind::Services, &err);
            }
        }
    }

    async fn on_export(&mut self, command_line: &str, result: Result<ProcessOutput>) {
        let output = match result.and_then(|output| output.require_success(command_line)) {
            Ok(output) => output,
            Err(err) => return self.report(CommandKind::Export, &err),
        };

        match write_package_list(&self.paths.export_dir, &output.output).await {
            Ok(path) => self.emit(AgentEvent::ExportWritten { path }),
            Err(err) => self.report(CommandKind::Export, &err),
        }
    }

    /// 变更命令失败也只记录，后续轮询照常进行
    fn report_mutation(&mut self, kind: CommandKind, command_line: &str, result: Result<ProcessOutput>) {
        match result.and_then(|output| output.require_success(command_line)) {
            Ok(_) => info!("{} 已完成", command_line),
            Err(err) => self.report(kind, &err),
        }
    }

    fn report(&self, kind: CommandKind, err: &BrewletError) {
        error!("{:?} 失败: {}", kind, err);
        self.emit(AgentEvent::error(kind, err));
    }

    fn is_in_flight(&self, kind: CommandKind) -> bool {
        self.in_flight.get(&kind).copied().unwrap_or(0) > 0
    }

    fn mark_started(&mut self, kind: CommandKind) {
        let count = self.in_flight.entry(kind).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.emit(AgentEvent::InFlightChanged {
                command: kind,
                in_flight: true,
            });
        }
    }

    fn mark_finished(&mut self, kind: CommandKind) {
        let remaining = match self.in_flight.get_mut(&kind) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            _ => return,
        };
        if remaining == 0 {
            self.emit(AgentEvent::InFlightChanged {
                command: kind,
                in_flight: false,
            });
        }
    }

    fn emit(&self, event: AgentEvent) {
        if self.events.send(event).is_err() {
            debug!("事件接收端已关闭");
        }
    }
}

