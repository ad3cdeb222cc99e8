//! 运行时认证配置（`/auth-config.json`）
//!
//! 文件不存在或无法解析都不算错误，沿用默认配置。

use common::AuthConfigOverride;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

pub const AUTH_CONFIG_PATH: &str = "/auth-config.json";

pub async fn fetch_auth_override(client: &Client, origin: &str) -> Option<AuthConfigOverride> {
    let url = format!("{}{}", origin.trim_end_matches('/'), AUTH_CONFIG_PATH);

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "Could not fetch runtime auth config, using defaults");
            return None;
        }
    };

    match response.status() {
        status if status.is_success() => match response.json::<AuthConfigOverride>().await {
            Ok(config) => {
                info!(url = %url, "Loaded runtime auth config");
                Some(config)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Runtime auth config is not valid JSON, ignoring");
                None
            }
        },
        StatusCode::NOT_FOUND => {
            debug!(url = %url, "No runtime auth config published");
            None
        }
        status => {
            warn!(url = %url, status = status.as_u16(), "Unexpected status for runtime auth config");
            None
        }
    }
}
