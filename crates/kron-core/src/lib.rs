//! Shared model for the kron controller: templates, executions, watch
//! events, label conventions, the cluster capability trait and
//! configuration.

pub mod app_config;
pub mod client;
pub mod config;
pub mod error;
pub mod labels;
pub mod types;

pub use app_config::AppConfig;
pub use client::{ClusterClient, ClusterError};
pub use config::{load_app_config, load_config_file, ConfigFile};
pub use error::ConfigError;
pub use types::{
    JobTemplate, NewExecution, ObjectRef, Pod, ScheduledExecution, WatchError, WatchEvent,
};
