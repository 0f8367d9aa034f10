use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Falls back to `DATABASE_URL` at pool creation when unset here
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Apply embedded migrations when the server starts
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub enable_audit_logging: bool,
    pub min_password_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::for_environment(environment).with_overrides(|key| env::var(key).ok())
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    /// Apply overrides from a key lookup. Unparseable values keep the profile default.
    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *target = parsed;
            }
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = Some(v);
        }
        parse_into(lookup("DATABASE_MAX_CONNECTIONS"), &mut self.database.max_connections);
        parse_into(lookup("DATABASE_CONNECTION_TIMEOUT"), &mut self.database.connection_timeout);
        parse_into(lookup("DATABASE_AUTO_MIGRATE"), &mut self.database.auto_migrate);

        // API overrides; the bare PORT is honoured for container platforms
        parse_into(lookup("PORT"), &mut self.api.port);
        parse_into(lookup("SAT_API_PORT"), &mut self.api.port);
        parse_into(lookup("API_MAX_REQUEST_SIZE_BYTES"), &mut self.api.max_request_size_bytes);
        parse_into(lookup("API_DEFAULT_PAGE_SIZE"), &mut self.api.default_page_size);
        parse_into(lookup("API_MAX_PAGE_SIZE"), &mut self.api.max_page_size);

        // Security overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        parse_into(lookup("SECURITY_JWT_EXPIRY_HOURS"), &mut self.security.jwt_expiry_hours);
        parse_into(lookup("SECURITY_ENABLE_CORS"), &mut self.security.enable_cors);
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        parse_into(lookup("SECURITY_ENABLE_AUDIT_LOGGING"), &mut self.security.enable_audit_logging);
        parse_into(lookup("SECURITY_MIN_PASSWORD_LENGTH"), &mut self.security.min_password_length);

        // Storage overrides
        if let Some(v) = lookup("STORAGE_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(v);
        }
        parse_into(lookup("STORAGE_MAX_UPLOAD_BYTES"), &mut self.storage.max_upload_bytes);

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                auto_migrate: true,
            },
            api: ApiConfig {
                port: 3001,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                default_page_size: 50,
                max_page_size: 1000,
            },
            security: SecurityConfig {
                jwt_secret: "sat-dev-secret-do-not-use-in-production".to_string(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                enable_audit_logging: true,
                min_password_length: 6,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                max_upload_bytes: 10 * 1024 * 1024,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                auto_migrate: true,
            },
            api: ApiConfig {
                port: 3001,
                max_request_size_bytes: 10 * 1024 * 1024,
                default_page_size: 50,
                max_page_size: 500,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_audit_logging: true,
                min_password_length: 8,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                max_upload_bytes: 10 * 1024 * 1024,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                auto_migrate: false,
            },
            api: ApiConfig {
                port: 3001,
                max_request_size_bytes: 10 * 1024 * 1024,
                default_page_size: 50,
                max_page_size: 200,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_audit_logging: true,
                min_password_length: 8,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("/var/lib/sat-report/uploads"),
                max_upload_bytes: 10 * 1024 * 1024,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(!config.security.jwt_secret.is_empty());
        assert!(config.database.auto_migrate);
        assert_eq!(config.security.jwt_expiry_hours, 24);
        assert_eq!(config.api.default_page_size, 50);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.security.jwt_secret.is_empty(), "production must supply its own secret");
        assert!(!config.database.auto_migrate);
        assert!(config.security.enable_audit_logging);
    }

    #[test]
    fn overrides_replace_profile_values() {
        let config = AppConfig::development().with_overrides(lookup_from(&[
            ("SAT_API_PORT", "4100"),
            ("JWT_SECRET", "s3cret"),
            ("SECURITY_CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("SECURITY_ENABLE_AUDIT_LOGGING", "false"),
            ("STORAGE_MAX_UPLOAD_BYTES", "1024"),
        ]));

        assert_eq!(config.api.port, 4100);
        assert_eq!(config.security.jwt_secret, "s3cret");
        assert_eq!(config.security.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(!config.security.enable_audit_logging);
        assert_eq!(config.storage.max_upload_bytes, 1024);
    }

    #[test]
    fn unparseable_override_keeps_default() {
        let config = AppConfig::staging().with_overrides(lookup_from(&[
            ("DATABASE_MAX_CONNECTIONS", "lots"),
            ("PORT", "8080"),
        ]));
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn specific_port_wins_over_generic() {
        let config = AppConfig::development()
            .with_overrides(lookup_from(&[("PORT", "8080"), ("SAT_API_PORT", "9090")]));
        assert_eq!(config.api.port, 9090);
    }
}
