//! Side-effecting adapters: configuration, subprocesses, GitHub, the agent
//! executor and the decision oracle.

pub mod config;
pub mod environment;
pub mod executor;
pub mod item_store;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod report;
