use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the user token.
pub const TOKEN_KEY: &str = "HOIST_TOKEN";
/// Environment variable overriding the service address.
pub const ADDRESS_KEY: &str = "HOIST_ADDR";
/// Environment variable pointing at an alternate config file.
pub const CONFIG_PATH_KEY: &str = "HOIST_CONFIG";

const DEFAULT_ADDRESS: &str = "https://hoist.cloud";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to find a config file or the 'HOIST_TOKEN' environment variable")]
    TokenMissing,

    #[error("failed to read config at '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// User token for the main API.
    pub user_token: String,
    /// Address of the service.
    #[serde(default = "default_address")]
    pub agent_address: String,
    /// Organization assumed when a workspace or cluster name carries none.
    #[serde(default)]
    pub default_org: Option<String>,
    /// Workspace used when an operation doesn't name one.
    #[serde(default)]
    pub default_workspace: Option<String>,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("user_token", &"***")
            .field("agent_address", &self.agent_address)
            .field("default_org", &self.default_org)
            .field("default_workspace", &self.default_workspace)
            .finish()
    }
}

impl Config {
    pub fn new(user_token: impl Into<String>) -> Self {
        Self {
            user_token: user_token.into(),
            agent_address: default_address(),
            default_org: None,
            default_workspace: None,
        }
    }

    /// Initialize from environment variables or a local config file.
    /// Environment variables take precedence over values in the file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_KEY)
            .map(PathBuf::from)
            .ok()
            .or_else(|| Self::default_location().filter(|p| p.exists()));
        let mut config = match path {
            Some(path) => Self::from_path(&path)?,
            None => match env::var(TOKEN_KEY) {
                Ok(token) => Self::new(token),
                Err(_) => return Err(ConfigError::TokenMissing),
            },
        };
        if let Ok(token) = env::var(TOKEN_KEY) {
            config.user_token = token;
        }
        if let Ok(address) = env::var(ADDRESS_KEY) {
            config.agent_address = address;
        }
        if config.user_token.is_empty() {
            return Err(ConfigError::TokenMissing);
        }
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    fn default_location() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(".config").join("hoist").join("config.toml"))
    }
}
