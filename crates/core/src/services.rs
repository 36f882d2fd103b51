use crate::package::Service;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceVerb {
    Start,
    Stop,
    Restart,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Start => "start",
            ServiceVerb::Stop => "stop",
            ServiceVerb::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceTarget {
    One(String),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAction {
    pub verb: ServiceVerb,
    pub target: ServiceTarget,
}

impl ServiceAction {
    /// `services <verb> <name|--all>`
    pub fn args(&self) -> Vec<String> {
        let target = match &self.target {
            ServiceTarget::One(name) => name.clone(),
            ServiceTarget::All => "--all".to_string(),
        };
        vec!["services".to_string(), self.verb.to_string(), target]
    }
}

/// 切换单个服务：已停止则启动，运行中则停止
pub fn compute_action(name: &str, currently_stopped: bool) -> ServiceAction {
    let verb = if currently_stopped {
        ServiceVerb::Start
    } else {
        ServiceVerb::Stop
    };
    ServiceAction {
        verb,
        target: ServiceTarget::One(name.to_string()),
    }
}

pub fn compute_bulk_action(verb: ServiceVerb) -> ServiceAction {
    ServiceAction {
        verb,
        target: ServiceTarget::All,
    }
}

/// 服务列表同步的序号，按派发顺序递增
pub type SyncGeneration = u64;

/// 同步或操作进行中时所有服务控制均不可用
#[derive(Debug, Default)]
pub struct ServiceSyncer {
    services: Vec<Service>,
    busy: bool,
    action_pending: bool,
    /// 最近一次派发的同步
    generation: SyncGeneration,
    /// 最近一次应用到列表的同步
    applied: SyncGeneration,
    /// 只有不早于该序号的同步才能重新启用控制
    release_from: SyncGeneration,
}

impl ServiceSyncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn controls_enabled(&self) -> bool {
        !self.busy
    }

    pub fn begin_sync(&mut self) -> SyncGeneration {
        self.busy = true;
        self.generation += 1;
        self.generation
    }

    /// 新列表到达后重新启用控制；操作结束前派发的同步只更新列表
    pub fn finish_sync(&mut self, generation: SyncGeneration, services: Vec<Service>) {
        if generation >= self.applied {
            debug!("服务列表已更新: {} 个 (同步 #{})", services.len(), generation);
            self.services = services;
            self.applied = generation;
        } else {
            debug!("忽略过期的服务列表 (同步 #{})", generation);
        }
        self.settle(generation);
    }

    /// 轮询失败时保留旧列表
    pub fn abort_sync(&mut self, generation: SyncGeneration) {
        self.settle(generation);
    }

    /// 操作结束后仍需等待之后派发的同步完成才会重新启用
    pub fn finish_action(&mut self) {
        self.action_pending = false;
        self.release_from = self.generation + 1;
    }

    fn settle(&mut self, generation: SyncGeneration) {
        if !self.action_pending && generation >= self.release_from {
            self.busy = false;
        }
    }

    pub fn toggle(&mut self, name: &str) -> Option<ServiceAction> {
        if self.busy {
            return None;
        }
        let service = self.services.iter().find(|service| service.name == name)?;
        let action = compute_action(&service.name, service.stopped);
        self.busy = true;
        self.action_pending = true;
        Some(action)
    }

    pub fn bulk(&mut self, verb: ServiceVerb) -> Option<ServiceAction> {
        if self.busy {
            return None;
        }
        self.busy = true;
        self.action_pending = true;
        Some(compute_bulk_action(verb))
    }
}
