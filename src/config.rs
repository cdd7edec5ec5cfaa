//! Authentication config: registered users and the session cookie policy.
//!
//! Loaded once at startup from a YAML document and shared read-only for the
//! lifetime of the process. Any problem here is fatal: no page can be served
//! without a valid config.

use crate::cookie::{CookiePolicy, MAX_EXPIRY_DAYS};
use crate::credentials::{self, Credentials, UserRecord};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the config, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = ".dashgate/auth_config.yaml";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Malformed(#[from] serde_yaml::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    credentials: RawCredentials,
    cookie: CookiePolicy,
}

#[derive(Debug, Deserialize)]
struct RawCredentials {
    #[serde(default)]
    usernames: HashMap<String, UserRecord>,
}

/// Process-wide authentication state
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub credentials: Credentials,
    pub cookie: CookiePolicy,
}

impl AuthConfig {
    pub fn new(credentials: Credentials, cookie: CookiePolicy) -> Self {
        Self {
            credentials,
            cookie,
        }
    }

    /// Load and validate the config at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;
        let config = Self::new(Credentials::new(raw.credentials.usernames), raw.cookie);
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        // RFC 6265 cookie-name token
        let name_ok = Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$")
            .map(|re| re.is_match(&self.cookie.name))
            .unwrap_or(false);
        if !name_ok {
            errors.push(ValidationError {
                field: "cookie.name".to_string(),
                message: format!("Invalid cookie name '{}'", self.cookie.name),
            });
        }

        if self.cookie.key.is_empty() {
            errors.push(ValidationError {
                field: "cookie.key".to_string(),
                message: "Signing key must not be empty".to_string(),
            });
        }

        if self.cookie.expiry_days == 0 {
            errors.push(ValidationError {
                field: "cookie.expiry_days".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        } else if self.cookie.expiry_days > MAX_EXPIRY_DAYS {
            errors.push(ValidationError {
                field: "cookie.expiry_days".to_string(),
                message: format!("Must be at most {}", MAX_EXPIRY_DAYS),
            });
        }

        let mut users: Vec<_> = self.credentials.iter().collect();
        users.sort_by(|a, b| a.0.cmp(b.0));
        for (username, record) in users {
            if username.is_empty() {
                errors.push(ValidationError {
                    field: "credentials.usernames".to_string(),
                    message: "Username must not be empty".to_string(),
                });
            }
            if record.name.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("credentials.usernames.{}.name", username),
                    message: "Display name must not be empty".to_string(),
                });
            }
            if !credentials::is_valid_hash(&record.password) {
                errors.push(ValidationError {
                    field: format!("credentials.usernames.{}.password", username),
                    message: "Expected an argon2 PHC hash (see --hash-password)".to_string(),
                });
            }
        }

        for username in self.credentials.collisions() {
            errors.push(ValidationError {
                field: format!("credentials.usernames.{}", username),
                message: "Several entries differ only by case".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
