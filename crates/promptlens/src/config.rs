//! Proxy configuration: TOML file and environment overrides for tunables,
//! CLI flags for the launch parameters.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Runtime configuration for the capturing proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Address to bind, e.g. "127.0.0.1:8080".
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upstream base URL requests are mirrored to.
    #[serde(default)]
    pub target: String,

    /// Capture log path, appended to.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Upstream connect timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upstream idle read timeout (time between bytes, not total).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Cap on buffered client request bodies.
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("capture.jsonl")
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    300
}

fn default_max_request_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl ProxyConfig {
    /// Load configuration, priority (highest to lowest):
    /// 1. CLI flags (host/port/target/output)
    /// 2. Environment variables (PROMPTLENS_ prefix)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(
        config_path: Option<&Path>,
        host: &str,
        port: u16,
        target: &str,
        output: &Path,
    ) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let mut config: ProxyConfig = figment
            .merge(Env::prefixed("PROMPTLENS_").split("__"))
            .extract()?;

        config.listen_address = format!("{host}:{port}");
        config.target = target.trim_end_matches('/').to_string();
        config.output = output.to_path_buf();
        Ok(config)
    }
}
