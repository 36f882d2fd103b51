use brewlet_core::{CommandKind, ServiceAction};
use std::path::PathBuf;

pub const ARM_BREW_PATH: &str = "/opt/homebrew/bin/brew";
pub const INTEL_BREW_PATH: &str = "/usr/local/bin/brew";

/// Apple Silicon 与 Intel 的默认安装位置不同
pub fn default_brew_path() -> PathBuf {
    if cfg!(target_arch = "aarch64") {
        PathBuf::from(ARM_BREW_PATH)
    } else {
        PathBuf::from(INTEL_BREW_PATH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfoSchema {
    /// `--json=v2`，包含 formulae 与 casks
    #[default]
    V2,
    /// `--json`，扁平数组
    V1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrewCommand {
    InstalledInfo(InfoSchema),
    Outdated { verbose: bool },
    Summary,
    Update,
    Upgrade { formula_only: bool },
    UpgradePackage(String),
    Cleanup,
    ListNames,
    AnalyticsState,
    SetAnalytics(bool),
    ServicesList,
    Service(ServiceAction),
}

impl BrewCommand {
    pub fn args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            BrewCommand::InstalledInfo(InfoSchema::V2) => vec!["info", "--json=v2", "--installed"],
            BrewCommand::InstalledInfo(InfoSchema::V1) => vec!["info", "--json", "--installed"],
            BrewCommand::Outdated { verbose: true } => vec!["outdated", "-v"],
            BrewCommand::Outdated { verbose: false } => vec!["outdated"],
            BrewCommand::Summary => vec!["info"],
            BrewCommand::Update => vec!["update"],
            BrewCommand::Upgrade { formula_only: true } => vec!["upgrade", "--formula"],
            BrewCommand::Upgrade { formula_only: false } => vec!["upgrade"],
            BrewCommand::UpgradePackage(name) => vec!["upgrade", name.as_str()],
            BrewCommand::Cleanup => vec!["cleanup"],
            BrewCommand::ListNames => vec!["list", "-1"],
            BrewCommand::AnalyticsState => vec!["analytics", "state"],
            BrewCommand::SetAnalytics(true) => vec!["analytics", "on"],
            BrewCommand::SetAnalytics(false) => vec!["analytics", "off"],
            BrewCommand::ServicesList => vec!["services"],
            BrewCommand::Service(action) => return action.args(),
        };
        args.into_iter().map(str::to_string).collect()
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            BrewCommand::InstalledInfo(_) | BrewCommand::Outdated { .. } => CommandKind::Packages,
            BrewCommand::Summary => CommandKind::Info,
            BrewCommand::Update => CommandKind::Update,
            BrewCommand::Upgrade { .. } => CommandKind::Upgrade,
            BrewCommand::UpgradePackage(_) => CommandKind::UpgradePackage,
            BrewCommand::Cleanup => CommandKind::Cleanup,
            BrewCommand::ListNames => CommandKind::Export,
            BrewCommand::AnalyticsState => CommandKind::Analytics,
            BrewCommand::SetAnalytics(_) => CommandKind::AnalyticsToggle,
            BrewCommand::ServicesList => CommandKind::Services,
            BrewCommand::Service(_) => CommandKind::ServiceAction,
        }
    }

    /// 输出写入命令日志而不是内存
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            BrewCommand::Update | BrewCommand::Upgrade { .. } | BrewCommand::UpgradePackage(_)
        )
    }
}
