//! Purpose: Connection settings for a MarkLogic REST instance.
//! Exports: `Config`, `AuthScheme`, `default_config`, `configure`.
//! Role: Plain mutable record; no validation, no I/O.
//! Invariants: Defaults match a stock local MarkLogic install (localhost:8000, digest).
//! Invariants: The process-wide default is opt-in; constructors take explicit configs.

use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AuthScheme {
    Basic,
    #[default]
    Digest,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth: AuthScheme,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            username: None,
            password: None,
            auth: AuthScheme::Digest,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Both halves of the credential pair, when configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::new()));

/// Snapshot of the process-wide default configuration.
///
/// Lazily initialized to [`Config::new`]. Connections only consult this when
/// built via `Connection::from_default`; passing an explicit `Config` is the
/// primary path.
pub fn default_config() -> Config {
    DEFAULT_CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Apply a batch of overrides to the process-wide default configuration.
pub fn configure<F>(apply: F)
where
    F: FnOnce(&mut Config),
{
    let mut config = DEFAULT_CONFIG
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    apply(&mut config);
}

#[cfg(test)]
mod tests {
    use super::{AuthScheme, Config};

    #[test]
    fn defaults_match_stock_install() {
        let config = Config::new();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8000);
        assert_eq!(config.auth, AuthScheme::Digest);
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn builders_override_fields() {
        let config = Config::new()
            .with_host("ml.internal")
            .with_port(8010)
            .with_credentials("admin", "secret")
            .with_auth(AuthScheme::Basic);
        assert_eq!(config.host, "ml.internal");
        assert_eq!(config.port, 8010);
        assert_eq!(config.credentials(), Some(("admin", "secret")));
        assert_eq!(config.auth, AuthScheme::Basic);
    }

    #[test]
    fn credentials_require_both_halves() {
        let mut config = Config::new();
        config.username = Some("admin".to_string());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let a = Config::new().with_host("a.example");
        let b = Config::new();
        assert_eq!(b.host, "localhost");
        assert_ne!(a, b);
    }
}
