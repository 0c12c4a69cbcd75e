//! Credentials and runtime configuration.
//!
//! Credentials come from a JSON file (`credentials.json` in the working
//! directory by default) holding the path of the PKCS#12 client certificate
//! and its passphrase.
//!
//! Everything else has built-in defaults that can be overridden by
//! `~/.config/covidpass/config.json` and then by `COVIDPASS_*` environment
//! variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Application name used for the config directory path
const APP_NAME: &str = "covidpass";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_SESSION_FILE: &str = "cookies.json";
pub const DEFAULT_API_BASE_URL: &str = "https://api.mit.edu";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://atlas-auth.mit.edu/oauth2/authorize?identity_provider=Touchstone&redirect_uri=https://covidpass.mit.edu&response_type=TOKEN&client_id=2ao42ccnajj7jpqd7h059n7eoc&scope=covid19/user%20openid";
pub const DEFAULT_REDIRECT_URI: &str = "https://covidpass.mit.edu";

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Could not open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Client certificate bundle and its passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub certfile: PathBuf,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            certfile: PathBuf::from("./cert.p12"),
            password: String::new(),
        }
    }
}

/// Read credentials from `path`, applying defaults for omitted fields.
pub fn read_credentials(path: &Path) -> Result<Credentials, CredentialsError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CredentialsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CredentialsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials_file: PathBuf,
    pub session_file: PathBuf,
    pub api_base_url: String,
    pub authorize_url: String,
    pub redirect_uri: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

impl Config {
    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading config file");
                let contents = std::fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `COVIDPASS_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("COVIDPASS_CREDENTIALS") {
            self.credentials_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("COVIDPASS_SESSION_FILE") {
            self.session_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("COVIDPASS_API_BASE") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("COVIDPASS_AUTHORIZE_URL") {
            self.authorize_url = v;
        }
        if let Some(v) = lookup("COVIDPASS_REDIRECT_URI") {
            self.redirect_uri = v;
        }
    }

    /// Build an API URL from a path such as `/pass-v1/pass/access_status`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
