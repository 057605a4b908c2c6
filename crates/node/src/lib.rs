// node/src/lib.rs
pub mod config;
pub mod runtime;

pub use config::{NodeConfig, StorageBackend, StorageConfig};
pub use runtime::{Node, NodeStatus, TemplateSummary};
