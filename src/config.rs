//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `VOLAIR_BASE_DIR`, `VOLAIR_LOG_LEVEL` and `VOLAIR_SERVER_URL`.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::client::{
    ClientOptions, DEFAULT_DEV_SERVER_PORT, DEFAULT_DEV_SERVER_PROGRAM, DEFAULT_LLM_MODEL,
    ProcessDevServer,
};
use crate::error::AppError;
use crate::logger;

/// Remote client settings (`[client]`).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to connect to at startup; `None` skips the connection.
    pub server_url: Option<String>,
    pub request_timeout_seconds: u64,
    pub status_timeout_seconds: u64,
    pub default_llm_model: String,
    pub debug: bool,
}

/// Local dev server settings (`[dev_server]`).
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Address dev-server URLs are rewritten to.
    pub url: String,
    pub startup_timeout_seconds: u64,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the store files (already expanded, no `~`).
    pub base_dir: PathBuf,
    pub log_level: String,
    pub client: ClientConfig,
    pub dev_server: DevServerConfig,
}

impl Config {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.client.request_timeout_seconds),
            status_timeout: Duration::from_secs(self.client.status_timeout_seconds),
            default_llm_model: self.client.default_llm_model.clone(),
            debug: self.client.debug,
            dev_server_url: self.dev_server.url.clone(),
            dev_server_startup_timeout: Duration::from_secs(self.dev_server.startup_timeout_seconds),
        }
    }

    pub fn dev_server(&self) -> ProcessDevServer {
        ProcessDevServer::new(self.dev_server.program.clone(), self.dev_server.args.clone())
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    volair: RawVolair,
    #[serde(default)]
    client: RawClient,
    #[serde(default)]
    dev_server: RawDevServer,
}

#[derive(Deserialize)]
struct RawVolair {
    #[serde(default = "default_base_dir")]
    base_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "default_status_timeout_seconds")]
    status_timeout_seconds: u64,
    #[serde(default = "default_llm_model")]
    default_llm_model: String,
    #[serde(default)]
    debug: bool,
}

impl Default for RawClient {
    fn default() -> Self {
        Self {
            server_url: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            status_timeout_seconds: default_status_timeout_seconds(),
            default_llm_model: default_llm_model(),
            debug: false,
        }
    }
}

#[derive(Deserialize)]
struct RawDevServer {
    #[serde(default = "default_dev_server_program")]
    program: String,
    #[serde(default = "default_dev_server_args")]
    args: Vec<String>,
    #[serde(default = "default_dev_server_url")]
    url: String,
    #[serde(default = "default_dev_server_startup_timeout_seconds")]
    startup_timeout_seconds: u64,
}

impl Default for RawDevServer {
    fn default() -> Self {
        Self {
            program: default_dev_server_program(),
            args: default_dev_server_args(),
            url: default_dev_server_url(),
            startup_timeout_seconds: default_dev_server_startup_timeout_seconds(),
        }
    }
}

fn default_base_dir() -> String { "~/.volair".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_request_timeout_seconds() -> u64 { 600 }
fn default_status_timeout_seconds() -> u64 { 5 }
fn default_llm_model() -> String { DEFAULT_LLM_MODEL.to_string() }
fn default_dev_server_program() -> String { DEFAULT_DEV_SERVER_PROGRAM.to_string() }
fn default_dev_server_args() -> Vec<String> {
    vec!["--port".to_string(), DEFAULT_DEV_SERVER_PORT.to_string()]
}
fn default_dev_server_url() -> String { format!("http://localhost:{DEFAULT_DEV_SERVER_PORT}") }
fn default_dev_server_startup_timeout_seconds() -> u64 { 30 }

/// Env-var overrides applied on top of the TOML file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_dir: Option<String>,
    pub log_level: Option<String>,
    pub server_url: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var("VOLAIR_BASE_DIR").ok(),
            log_level: env::var("VOLAIR_LOG_LEVEL").ok(),
            server_url: env::var("VOLAIR_SERVER_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    load_from(Path::new("config/default.toml"), &Overrides::from_env())
}

/// Loader with an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let base_dir = expand_home(overrides.base_dir.as_deref().unwrap_or(&parsed.volair.base_dir));
    let log_level = overrides
        .log_level
        .clone()
        .unwrap_or(parsed.volair.log_level);
    let server_url = overrides
        .server_url
        .clone()
        .or(parsed.client.server_url)
        .filter(|s| !s.is_empty());

    logger::parse_level(&log_level)
        .map_err(|e| AppError::Config(format!("volair.log_level: {e}")))?;

    if parsed.client.request_timeout_seconds == 0 {
        return Err(AppError::Config("client.request_timeout_seconds must be > 0".into()));
    }
    if parsed.client.status_timeout_seconds == 0 {
        return Err(AppError::Config("client.status_timeout_seconds must be > 0".into()));
    }

    Ok(Config {
        base_dir,
        log_level,
        client: ClientConfig {
            server_url,
            request_timeout_seconds: parsed.client.request_timeout_seconds,
            status_timeout_seconds: parsed.client.status_timeout_seconds,
            default_llm_model: parsed.client.default_llm_model,
            debug: parsed.client.debug,
        },
        dev_server: DevServerConfig {
            program: parsed.dev_server.program,
            args: parsed.dev_server.args,
            url: parsed.dev_server.url,
            startup_timeout_seconds: parsed.dev_server.startup_timeout_seconds,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
