pub mod config;
pub mod events;
pub mod package;
pub mod reconcile;
pub mod runner;
pub mod scheduler;
pub mod services;

pub use config::{AgentConfig, InMemorySettings, SettingsStore};
pub use events::{AgentEvent, CommandKind, POLL_SEQUENCE};
pub use package::{InclusionPolicy, InstallEntry, Package, PackageKind, Service, Snapshot};
pub use reconcile::{reconcile, ChangeDecision, ReconciliationEngine};
pub use runner::{CommandRequest, CommandRunner, OutputSink, PendingOutput, ProcessOutput, ProcessRunner};
pub use scheduler::{PeriodChange, Scheduler, SchedulerState, Tick, UpdateInterval, DEFAULT_PERIOD, MAX_PERIOD, NEVER};
pub use services::{ServiceAction, ServiceSyncer, ServiceTarget, ServiceVerb, SyncGeneration};
