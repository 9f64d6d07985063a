//! Configuration for the desync proxy core.
//!
//! The proxy is configured through a single JSON file, `yallahdpi-config.json`,
//! read from the current working directory at startup. If the file is absent
//! or fails to parse, a default configuration is written out and used in its
//! place, following a load-or-seed pattern so a first run always has a
//! usable configuration on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The name of the configuration file the core looks for next to the binary.
pub const CONFIG_FILE_NAME: &str = "yallahdpi-config.json";

/// Immutable run parameters for the proxy core.
///
/// Every field here is loaded once at startup and never mutated afterwards;
/// handlers only ever see a shared, read-only `Config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_address: String,
    pub listen_port: u16,
    pub max_connections: usize,
    pub buffer_size: usize,

    /// Desync method discriminator. Only `"split"` has any effect today.
    pub desync_method: String,
    /// Non-negative byte offset for the generic HTTP/TLS split.
    pub split_position: usize,
    /// Prefer the byte index of `host:` over `split_position` for HTTP flows.
    pub split_at_host: bool,
    pub desync_http: bool,
    pub desync_https: bool,
    /// Reserved; wired through config but not implemented.
    pub desync_udp: bool,

    pub host_remove_spaces: bool,
    pub host_mixed_case: bool,
    pub domain_mixed_case: bool,

    pub tls_record_split: bool,
    /// Offset within the record payload (not counting the 5-byte header).
    pub tls_record_split_pos: usize,
    pub tls_record_split_at_sni: bool,

    // Reserved fields carried over from the original configuration format
    // for file compatibility. The core does not act on them.
    pub fake_ttl: u32,
    pub fake_sni: String,
    pub default_ttl: u32,
    pub no_domain: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 1080,
            max_connections: 512,
            buffer_size: 16384,
            desync_method: "split".to_string(),
            split_position: 4,
            split_at_host: false,
            desync_http: true,
            desync_https: true,
            desync_udp: true,
            host_remove_spaces: true,
            host_mixed_case: false,
            domain_mixed_case: false,
            tls_record_split: true,
            tls_record_split_pos: 0,
            tls_record_split_at_sni: true,
            fake_ttl: 8,
            fake_sni: "www.iana.org".to_string(),
            default_ttl: 0,
            no_domain: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// The address the acceptor should bind to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }

    /// Load the configuration from [`CONFIG_FILE_NAME`] in `dir`, seeding the
    /// file with defaults if it is missing or malformed.
    pub fn load_from_dir(dir: &Path) -> Config {
        let path = dir.join(CONFIG_FILE_NAME);

        if let Ok(data) = std::fs::read_to_string(&path) {
            if let Ok(config) = serde_json::from_str::<Config>(&data) {
                return config;
            }
            log::warn!(
                "config file {} is malformed, falling back to defaults",
                path.display()
            );
        }

        let config = Config::default();
        if let Ok(data) = serde_json::to_string_pretty(&config) {
            if let Err(e) = std::fs::write(&path, data) {
                log::warn!("failed to write default config to {}: {}", path.display(), e);
            }
        }
        config
    }

    /// Load the configuration from [`CONFIG_FILE_NAME`] in the current
    /// working directory.
    pub fn load() -> Config {
        let cwd = std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf());
        Self::load_from_dir(&cwd)
    }
}
