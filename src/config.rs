//! 配置系统
//! 从环境变量加载所有配置，运行时可由 `/auth-config.json` 覆盖身份提供方参数

use common::AuthConfigOverride;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// 身份提供方（Keycloak）配置
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// 身份提供方根地址，例如 "http://localhost:8080"
    pub url: String,
    /// Realm 名称
    pub realm: String,
    /// 本应用的 client id，同时用于 client 级角色的查找
    pub client_id: String,
}

impl IdentityConfig {
    /// OpenID Connect token 端点地址
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.url.trim_end_matches('/'),
            self.realm
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 目录后端 REST API 地址
    pub base_url: String,
    /// 前端静态资源源站（`/auth-config.json` 所在位置）
    pub origin: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 令牌刷新周期（秒）
    pub refresh_interval_secs: u64,
    /// 持久化存储文件路径
    pub storage_path: PathBuf,
}

/// 特权角色名称
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub admin: String,
    pub manager: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, plain
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub roles: RoleConfig,
    pub logging: LoggingConfig,
}

pub const DEFAULT_ADMIN_ROLE: &str = "ROLE_hackathon.admin";
pub const DEFAULT_MANAGER_ROLE: &str = "ROLE_hackathon.manager";

impl AppConfig {
    /// 从环境变量加载配置（前缀 CATALOG_，层级分隔符 __）
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("identity.url", "http://localhost:8080")?
            .set_default("identity.realm", "hackathon")?
            .set_default("identity.client_id", "hackathon-frontend")?
            .set_default("api.base_url", "http://localhost:8081")?
            .set_default("api.origin", "http://localhost:3000")?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("session.refresh_interval_secs", 60)?
            .set_default("session.storage_path", ".house-catalog/session.json")?
            .set_default("roles.admin", DEFAULT_ADMIN_ROLE)?
            .set_default("roles.manager", DEFAULT_MANAGER_ROLE)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(
                Environment::with_prefix("CATALOG")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// 合并运行时认证配置，缺失的字段保留原值
    pub fn apply_auth_override(&mut self, remote: AuthConfigOverride) {
        if let Some(url) = remote.keycloak_url.filter(|v| !v.trim().is_empty()) {
            self.identity.url = url;
        }
        if let Some(realm) = remote.realm.filter(|v| !v.trim().is_empty()) {
            self.identity.realm = realm;
        }
        if let Some(client_id) = remote.client_id.filter(|v| !v.trim().is_empty()) {
            self.identity.client_id = client_id;
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.session.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("identity.url", &self.identity.url),
            ("api.base_url", &self.api.base_url),
            ("api.origin", &self.api.origin),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Message(format!(
                    "{} must start with http:// or https://, got: {}",
                    name, url
                )));
            }
        }

        if self.identity.realm.trim().is_empty() {
            return Err(ConfigError::Message("identity.realm must not be empty".to_string()));
        }

        if self.identity.client_id.trim().is_empty() {
            return Err(ConfigError::Message("identity.client_id must not be empty".to_string()));
        }

        if self.session.refresh_interval_secs < 1 || self.session.refresh_interval_secs > 3600 {
            return Err(ConfigError::Message(
                "session.refresh_interval_secs must be between 1 and 3600".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "plain" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, plain",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "CATALOG_IDENTITY__URL",
        "CATALOG_IDENTITY__REALM",
        "CATALOG_SESSION__REFRESH_INTERVAL_SECS",
        "CATALOG_LOGGING__LEVEL",
        "CATALOG_API__BASE_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.identity.url, "http://localhost:8080");
        assert_eq!(config.identity.realm, "hackathon");
        assert_eq!(config.session.refresh_interval_secs, 60);
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.roles.admin, DEFAULT_ADMIN_ROLE);
        assert_eq!(config.roles.manager, DEFAULT_MANAGER_ROLE);
    }

    #[test]
    #[serial]
    fn test_config_env_override() {
        clear_env();
        std::env::set_var("CATALOG_IDENTITY__REALM", "staging");
        std::env::set_var("CATALOG_SESSION__REFRESH_INTERVAL_SECS", "15");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.identity.realm, "staging");
        assert_eq!(config.session.refresh_interval_secs, 15);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_log_level() {
        clear_env();
        std::env::set_var("CATALOG_LOGGING__LEVEL", "verbose");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_url() {
        clear_env();
        std::env::set_var("CATALOG_API__BASE_URL", "localhost:8081");

        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("api.base_url"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_zero_interval() {
        clear_env();
        std::env::set_var("CATALOG_SESSION__REFRESH_INTERVAL_SECS", "0");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_token_endpoint() {
        clear_env();
        let mut config = AppConfig::from_env().unwrap();
        config.identity.url = "https://id.example.com/".to_string();
        config.identity.realm = "shop".to_string();

        assert_eq!(
            config.identity.token_endpoint(),
            "https://id.example.com/realms/shop/protocol/openid-connect/token"
        );
    }

    #[test]
    #[serial]
    fn test_apply_auth_override() {
        clear_env();
        let mut config = AppConfig::from_env().unwrap();

        config.apply_auth_override(AuthConfigOverride {
            keycloak_url: Some("https://id.example.com".to_string()),
            realm: None,
            client_id: Some("".to_string()),
        });

        assert_eq!(config.identity.url, "https://id.example.com");
        assert_eq!(config.identity.realm, "hackathon");
        assert_eq!(config.identity.client_id, "hackathon-frontend");
    }
}
