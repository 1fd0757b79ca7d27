pub mod config;
pub mod logger;
pub mod reconchain_toml;

pub use config::*;
pub use logger::{LogLevel, setup_logging};
pub use reconchain_toml::{
    ReconchainToml, apply_file_to_opts, default_config_path, load_reconchain_toml,
};
