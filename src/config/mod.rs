//! Runtime settings: endpoints, callback listener and OAuth scopes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read-only access to the Contacts and People APIs.
pub const CONTACTS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/contacts.readonly";

/// Read-only access to Admin SDK directory users.
pub const DIRECTORY_USER_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/admin.directory.user.readonly";

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV: &str = "GCONTACTS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Loopback port for the interactive OAuth callback listener.
    pub callback_port: u16,
    /// How long to wait for the browser redirect. 0 waits forever.
    pub callback_timeout_secs: u64,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback_port: 8000,
            callback_timeout_secs: 300,
            endpoints: Endpoints::default(),
        }
    }
}

/// Base URLs of every remote service the tool talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub contacts_url: String,
    pub people_url: String,
    pub directory_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            contacts_url: "https://www.google.com/m8/feeds/contacts".to_string(),
            people_url: "https://people.googleapis.com/v1".to_string(),
            directory_url: "https://admin.googleapis.com/admin/directory/v1".to_string(),
        }
    }
}

impl Config {
    /// Load settings from an explicit path, `$GCONTACTS_CONFIG`, or the user config dir.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Unable to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Unable to parse {}: {e}", path.display())))
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("gcontacts").join("config.toml"))
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Option<Duration> {
        (self.callback_timeout_secs > 0).then(|| Duration::from_secs(self.callback_timeout_secs))
    }
}

/// The OAuth scopes requested for a run.
///
/// Assembled once, before any credential is built, and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Contacts scope, plus the directory scope when an organization listing is needed.
    #[must_use]
    pub fn new(include_directory: bool) -> Self {
        let mut scopes = vec![CONTACTS_READONLY_SCOPE.to_string()];
        if include_directory {
            scopes.push(DIRECTORY_USER_READONLY_SCOPE.to_string());
        }
        Self(scopes)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// Space-delimited form used in authorization URLs and JWT claims.
    #[must_use]
    pub fn joined(&self) -> String {
        self.0.join(" ")
    }
}
