pub mod agent;
pub mod display;
pub mod export;
pub mod logging;

pub use agent::{Agent, AgentHandle, AgentPaths, Control};
