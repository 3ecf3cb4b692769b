//! Configuration loading, validation, and env substitution.
//!
//! Config files: `taskbridge.toml`, `taskbridge.yaml`, or `taskbridge.json`
//! Searched in `./` then `~/.config/taskbridge/`. Every field can also be
//! supplied through a `TASKBRIDGE_*` environment variable, which wins over
//! the file.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all
//! string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, default_data_dir, discover_and_load, find_config_file,
        load_config,
    },
    schema::{
        AccessConfig, BridgeConfig, PollerConfig, ProcessorConfig, QueueConfig, ResponderConfig,
        ServerConfig, WhatsAppConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
