//! Client configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML
//! file, environment variables, then command-line flags.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ChatError, Result};

pub const DEFAULT_API_HOST: &str = "http://localhost:8090";
pub const DEFAULT_LOG_FILTER: &str = "info";

pub const ENV_API_HOST: &str = "DEBATE_API_HOST";
pub const ENV_SESSION_COOKIE: &str = "DEBATE_SESSION_COOKIE";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Backend base URL, without a trailing slash.
    pub api_host: String,
    /// Raw `Cookie` header value sent with every request.
    pub session_cookie: Option<String>,
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_host: DEFAULT_API_HOST.to_string(),
            session_cookie: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// On-disk form; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_host: Option<String>,
    session_cookie: Option<String>,
    log_filter: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_host: Option<String>,
    pub verbose: bool,
}

impl ChatConfig {
    /// Build the effective configuration from every layer, reading the
    /// process environment.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::load_with_env(file, overrides, |key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with_env<F>(file: Option<&Path>, overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ChatConfig::default();
        if let Some(path) = file {
            config.merge_file(path)?;
        }
        config.merge_env(env);
        config.merge_overrides(overrides);
        config.normalize()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&text)?;
        if let Some(host) = file.api_host {
            self.api_host = host;
        }
        if file.session_cookie.is_some() {
            self.session_cookie = file.session_cookie;
        }
        if let Some(filter) = file.log_filter {
            self.log_filter = filter;
        }
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(())
    }

    fn merge_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = env(ENV_API_HOST) {
            self.api_host = host;
        }
        if let Some(cookie) = env(ENV_SESSION_COOKIE) {
            self.session_cookie = Some(cookie);
        }
        if let Some(filter) = env(ENV_LOG_FILTER) {
            self.log_filter = filter;
        }
    }

    fn merge_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.api_host {
            self.api_host = host.clone();
        }
        if overrides.verbose {
            self.log_filter = "debug".to_string();
        }
    }

    fn normalize(&mut self) -> Result<()> {
        let host = self.api_host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(ChatError::Config("api_host must not be empty".into()));
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "api_host must start with http:// or https:// (got '{}')",
                host
            )));
        }
        self.api_host = host.to_string();
        self.session_cookie = self
            .session_cookie
            .take()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_layers() {
        let config = ChatConfig::load_with_env(None, &ConfigOverrides::default(), env_of(&[])).unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn file_then_env_then_flags() {
        let file = write_config(
            "api_host = \"http://file:1\"\nsession_cookie = \"sid=file\"\nlog_filter = \"warn\"\n",
        );
        let env = env_of(&[(ENV_API_HOST, "http://env:2")]);

        let config = ChatConfig::load_with_env(Some(file.path()), &ConfigOverrides::default(), &env).unwrap();
        assert_eq!(config.api_host, "http://env:2");
        assert_eq!(config.session_cookie.as_deref(), Some("sid=file"));
        assert_eq!(config.log_filter, "warn");

        let flags = ConfigOverrides { api_host: Some("https://flag:3/".into()), verbose: true };
        let config = ChatConfig::load_with_env(Some(file.path()), &flags, &env).unwrap();
        assert_eq!(config.api_host, "https://flag:3");
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn trailing_slashes_trimmed() {
        let flags = ConfigOverrides { api_host: Some("http://api.example.com//".into()), verbose: false };
        let config = ChatConfig::load_with_env(None, &flags, env_of(&[])).unwrap();
        assert_eq!(config.api_host, "http://api.example.com");
    }

    #[test]
    fn empty_host_rejected() {
        let env = env_of(&[(ENV_API_HOST, "  ")]);
        let err = ChatConfig::load_with_env(None, &ConfigOverrides::default(), env).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn host_without_scheme_rejected() {
        let env = env_of(&[(ENV_API_HOST, "localhost:8090")]);
        assert!(ChatConfig::load_with_env(None, &ConfigOverrides::default(), env).is_err());
    }

    #[test]
    fn blank_cookie_dropped() {
        let env = env_of(&[(ENV_SESSION_COOKIE, "   ")]);
        let config = ChatConfig::load_with_env(None, &ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.session_cookie, None);
    }

    #[test]
    fn unknown_key_is_toml_error() {
        let file = write_config("api_hots = \"http://typo\"\n");
        let err = ChatConfig::load_with_env(Some(file.path()), &ConfigOverrides::default(), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, ChatError::Toml(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = Path::new("/definitely/not/here/debate-chat.toml");
        let err = ChatConfig::load_with_env(Some(path), &ConfigOverrides::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ChatError::Io(_)));
    }
}
