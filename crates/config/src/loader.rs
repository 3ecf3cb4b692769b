use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    env_subst::substitute_env,
    error::Context,
    schema::BridgeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "taskbridge.toml",
    "taskbridge.yaml",
    "taskbridge.yml",
    "taskbridge.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config, then apply `TASKBRIDGE_*` environment overrides.
///
/// Search order when `explicit` is `None`:
/// 1. `./taskbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/taskbridge/taskbridge.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to defaults when no file exists. A file that exists but does
/// not parse is an error: starting with silently-wrong credentials is worse
/// than not starting.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<BridgeConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(&path)?
        },
        None => {
            debug!("no config file found, using defaults and environment");
            BridgeConfig::default()
        },
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/taskbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "taskbridge").map(|d| d.config_dir().to_path_buf())
}

/// Returns the platform data directory, or `./data` when none can be
/// determined (containers without a home directory).
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "taskbridge")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

/// Overlay `TASKBRIDGE_*` environment variables onto `config`.
pub fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    config: &mut BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("TASKBRIDGE_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = get("TASKBRIDGE_PORT") {
        config.server.port = parse_num("TASKBRIDGE_PORT", &v)?;
    }
    if let Some(v) = get("TASKBRIDGE_DATA_DIR") {
        config.queue.data_dir = Some(PathBuf::from(v));
    }

    if let Some(v) = get("TASKBRIDGE_ACCESS_TOKEN") {
        config.whatsapp.access_token = Secret::new(v);
    }
    if let Some(v) = get("TASKBRIDGE_PHONE_NUMBER_ID") {
        config.whatsapp.phone_number_id = v;
    }
    if let Some(v) = get("TASKBRIDGE_VERIFY_TOKEN") {
        config.whatsapp.verify_token = Secret::new(v);
    }
    if let Some(v) = get("TASKBRIDGE_APP_SECRET") {
        config.whatsapp.app_secret = Some(Secret::new(v));
    }
    if let Some(v) = get("TASKBRIDGE_API_BASE") {
        config.whatsapp.api_base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = get("TASKBRIDGE_REQUEST_TIMEOUT_SECS") {
        config.whatsapp.request_timeout_secs = parse_num("TASKBRIDGE_REQUEST_TIMEOUT_SECS", &v)?;
    }

    if let Some(v) = get("TASKBRIDGE_ALLOWED_SENDERS") {
        config.access.allowed_senders = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(v) = get("TASKBRIDGE_LIST_URL") {
        config.poller.list_url = Some(v);
    }
    if let Some(v) = get("TASKBRIDGE_POLL_INTERVAL_SECS") {
        config.poller.interval_secs = parse_num("TASKBRIDGE_POLL_INTERVAL_SECS", &v)?;
    }

    if let Some(v) = get("TASKBRIDGE_PROCESS_INTERVAL_SECS") {
        config.processor.interval_secs = parse_num("TASKBRIDGE_PROCESS_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = get("TASKBRIDGE_ACK_REPLIES") {
        config.processor.ack_replies = parse_bool("TASKBRIDGE_ACK_REPLIES", &v)?;
    }

    if let Some(v) = get("TASKBRIDGE_SEND_ATTEMPTS") {
        config.responder.max_attempts = parse_num("TASKBRIDGE_SEND_ATTEMPTS", &v)?;
    }
    if let Some(v) = get("TASKBRIDGE_SEND_RETRY_DELAY_MS") {
        config.responder.retry_delay_ms = parse_num("TASKBRIDGE_SEND_RETRY_DELAY_MS", &v)?;
    }

    Ok(())
}

fn parse_num<T>(name: &'static str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::invalid_env(name, value, e))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_env(name, value, "expected true or false")),
    }
}
