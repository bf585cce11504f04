//! Top-level configuration: the document tree, include loading, bootstrap
//! and the staged resolve that turns documents into runnable tools.

mod bootstrap;
mod config;
mod error;
mod hostenv;
mod include;

pub use bootstrap::Bootstrap;
pub use config::{Config, Loaded};
pub use error::ConfigError;
pub use hostenv::host_env;
pub use include::{load_config_tree, IncludePolicy};
