use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub platform: PlatformConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Connection settings for the hosted backend.
#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    pub url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Where the confirmation email sends the user back to
    #[serde(default = "default_redirect_to")]
    pub redirect_to: String,
    /// Persist the session here so it survives restarts
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    /// Refresh the session when it expires within this many seconds
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    /// How often the auto-refresh loop looks at the session, in seconds
    #[serde(default = "default_refresh_check_secs")]
    pub refresh_check_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_redirect_to() -> String {
    "newschain://verify-email".to_string()
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_refresh_check_secs() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            redirect_to: default_redirect_to(),
            session_file: None,
            refresh_margin_secs: default_refresh_margin_secs(),
            refresh_check_secs: default_refresh_check_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `NEWSCHAIN_URL` / `NEWSCHAIN_ANON_KEY` overrides from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NEWSCHAIN_URL") {
            self.platform.url = url;
        }
        if let Some(anon_key) = lookup("NEWSCHAIN_ANON_KEY") {
            self.platform.anon_key = anon_key;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_timeout_secs(), 30);
        assert_eq!(default_redirect_to(), "newschain://verify-email");
        assert_eq!(default_refresh_margin_secs(), 60);
        assert_eq!(default_refresh_check_secs(), 30);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            [platform]
            url = "https://project.example.co"
            anon_key = "anon-key"
            timeout_secs = 10

            [auth]
            redirect_to = "newschain://custom"
            session_file = "/tmp/newschain-session.json"
            refresh_margin_secs = 120
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.platform.url, "https://project.example.co");
        assert_eq!(config.platform.anon_key, "anon-key");
        assert_eq!(config.platform.timeout_secs, 10);
        assert_eq!(config.auth.redirect_to, "newschain://custom");
        assert_eq!(
            config.auth.session_file,
            Some(PathBuf::from("/tmp/newschain-session.json"))
        );
        assert_eq!(config.auth.refresh_margin_secs, 120);
        assert_eq!(config.auth.refresh_check_secs, 30);
    }

    #[test]
    fn test_auth_section_is_optional() {
        let content = r#"
            [platform]
            url = "https://project.example.co"
            anon_key = "anon-key"
        "#;

        let config = Config::from_str(content).unwrap();

        assert_eq!(config.platform.timeout_secs, 30);
        assert_eq!(config.auth.redirect_to, "newschain://verify-email");
        assert!(config.auth.session_file.is_none());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/newschain.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_anon_key() {
        let content = r#"
            [platform]
            url = "https://project.example.co"
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let content = r#"
            [platform]
            url = "https://project.example.co"
            anon_key = "anon-key"
        "#;

        let config = Config::from_str(content)
            .unwrap()
            .with_overrides(|key| match key {
                "NEWSCHAIN_URL" => Some("http://localhost:54321".to_string()),
                _ => None,
            });

        assert_eq!(config.platform.url, "http://localhost:54321");
        assert_eq!(config.platform.anon_key, "anon-key");
    }
}
