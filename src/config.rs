use anyhow::{bail, Result};

const BACKEND_URL_ENV: &str = "RAGLINE_BACKEND_URL";
const ADMIN_KEY_ENV: &str = "RAGLINE_ADMIN_KEY";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub admin_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let backend_url = read_env(BACKEND_URL_ENV)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        Ok(Self {
            backend_url,
            admin_key: read_env(ADMIN_KEY_ENV),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            bail!(
                "invalid {BACKEND_URL_ENV} '{}': expected an http(s) URL",
                self.backend_url
            );
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_to_local_backend() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::remove_var(BACKEND_URL_ENV);
        std::env::remove_var(ADMIN_KEY_ENV);
        let config = Config::load().expect("config should load");
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn test_load_honors_env_overrides() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(BACKEND_URL_ENV, " https://rag.example.com ");
        std::env::set_var(ADMIN_KEY_ENV, "secret");
        let config = Config::load().expect("config should load");
        assert_eq!(config.backend_url, "https://rag.example.com");
        assert_eq!(config.admin_key.as_deref(), Some("secret"));
        std::env::remove_var(BACKEND_URL_ENV);
        std::env::remove_var(ADMIN_KEY_ENV);
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = Config {
            backend_url: "ftp://example.com".to_string(),
            admin_key: None,
        };
        assert!(config.validate().is_err());
    }
}
