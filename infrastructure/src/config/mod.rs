//! Configuration file loading

mod file_config;
mod loader;

pub use file_config::{FileConfig, FileEngineConfig, FileLogConfig, FileProviderConfig};
pub use loader::ConfigLoader;
