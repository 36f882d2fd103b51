use crate::package::Service;
use crate::reconcile::ChangeDecision;
use brewlet_error::BrewletError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Packages,
    Info,
    Analytics,
    Services,
    Update,
    Upgrade,
    UpgradePackage,
    Cleanup,
    Export,
    AnalyticsToggle,
    ServiceAction,
}

impl CommandKind {
    /// 用户触发的变更操作，同类进行中时拒绝重复提交
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            CommandKind::Packages | CommandKind::Info | CommandKind::Analytics | CommandKind::Services
        )
    }
}

/// 每次定时触发依次派发的轮询
pub const POLL_SEQUENCE: [CommandKind; 4] = [
    CommandKind::Packages,
    CommandKind::Info,
    CommandKind::Analytics,
    CommandKind::Services,
];

/// 发送给展示层的事件
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    OutdatedCountChanged {
        decision: ChangeDecision,
        checked_at: DateTime<Local>,
    },
    Notify {
        count: usize,
        packages: Vec<String>,
    },
    InfoTextUpdated {
        text: String,
    },
    AnalyticsStateChanged {
        enabled: bool,
    },
    ServicesListUpdated {
        services: Vec<Service>,
    },
    InFlightChanged {
        command: CommandKind,
        in_flight: bool,
    },
    ExportWritten {
        path: PathBuf,
    },
    Error {
        context: String,
        message: String,
    },
}

impl AgentEvent {
    pub fn error(command: CommandKind, err: &BrewletError) -> Self {
        AgentEvent::Error {
            context: format!("{:?}/{}", command, err.context()).to_lowercase(),
            message: err.to_string(),
        }
    }
}
