use std::path::PathBuf;

use anyhow::{Context, bail};

use blog_api::service::ServiceSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Memory,
    Sqlite(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage: Storage,
    pub jwt_secret: String,
    pub settings: ServiceSettings,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let port = get("BLOG_PORT", "8080")
            .parse()
            .context("BLOG_PORT must be a port number")?;

        let storage = match get("BLOG_STORAGE", "memory").to_ascii_lowercase().as_str() {
            "memory" => Storage::Memory,
            "sqlite" => Storage::Sqlite(PathBuf::from(get("BLOG_DB_PATH", "blog.db"))),
            other => bail!("unknown BLOG_STORAGE {:?}, expected memory or sqlite", other),
        };

        let defaults = ServiceSettings::default();
        let comment_page_size = match var("BLOG_COMMENT_PAGE_SIZE") {
            Some(v) => v
                .parse::<usize>()
                .context("BLOG_COMMENT_PAGE_SIZE must be a positive integer")?
                .clamp(1, blog_api::service::MAX_PAGE_SIZE),
            None => defaults.comment_page_size,
        };

        Ok(Self {
            host: get("BLOG_HOST", "0.0.0.0"),
            port,
            storage,
            jwt_secret: get("BLOG_JWT_SECRET", "dev-secret-change-me"),
            settings: ServiceSettings {
                fallback_author: var("BLOG_FALLBACK_AUTHOR").unwrap_or(defaults.fallback_author),
                comment_page_size,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage, Storage::Memory);
        assert_eq!(config.jwt_secret, "dev-secret-change-me");
        assert_eq!(config.settings.fallback_author, "anonymous");
        assert_eq!(config.settings.comment_page_size, 10);
    }

    #[test]
    fn sqlite_storage_uses_db_path() {
        let config = load(&[("BLOG_STORAGE", "SQLite"), ("BLOG_DB_PATH", "/tmp/x.db")]).unwrap();
        assert_eq!(config.storage, Storage::Sqlite(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("BLOG_PORT", "9000"),
            ("BLOG_FALLBACK_AUTHOR", "guest"),
            ("BLOG_COMMENT_PAGE_SIZE", "500"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.settings.fallback_author, "guest");
        assert_eq!(config.settings.comment_page_size, 100);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(load(&[("BLOG_PORT", "http")]).is_err());
        assert!(load(&[("BLOG_STORAGE", "postgres")]).is_err());
        assert!(load(&[("BLOG_COMMENT_PAGE_SIZE", "-1")]).is_err());
    }
}
