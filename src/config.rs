//! Layered server configuration
//!
//! Precedence, lowest first: built-in defaults, TOML file, `TABLETOP_*`
//! environment variables. Command-line flags are applied on top by the
//! binary.

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "tabletop.toml";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; `None` keeps everything in memory
    pub db_path: Option<String>,
    /// `EnvFilter` directives
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: None,
            log_filter: "tabletop=info,tower_http=debug".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Provider stack for `file`, or `tabletop.toml` when `None`.
    ///
    /// A missing file is skipped.
    pub fn figment(file: Option<&Path>) -> Figment {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("TABLETOP_"))
    }

    pub fn load(file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(file).extract()
    }
}
