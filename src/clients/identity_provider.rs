//! 身份提供方 token 端点客户端

use std::time::Duration;

use async_trait::async_trait;
use common::{TokenErrorBody, TokenResponse, INVALID_GRANT};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::AppError;

/// Token 端点调用失败
#[derive(Debug, Error)]
pub enum TokenError {
    /// 非 2xx 响应
    #[error("token endpoint rejected the request ({status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// 网络不可达、超时
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    /// 2xx 但响应体不是预期的 JSON
    #[error("token endpoint returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl TokenError {
    /// 凭据或刷新令牌被拒绝
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, TokenError::Rejected { error, .. } if error == INVALID_GRANT)
    }
}

/// OpenID Connect token 端点
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// 用户名密码登录（grant_type=password）
    async fn password_grant(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<TokenResponse, TokenError>;

    /// 刷新令牌（grant_type=refresh_token）
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, TokenError>;
}

/// Keycloak token 端点客户端
pub struct KeycloakClient {
    client: Client,
    token_url: String,
    client_id: String,
}

impl KeycloakClient {
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, config.token_endpoint(), config.client_id.clone()))
    }

    pub fn with_client(client: Client, token_url: String, client_id: String) -> Self {
        Self {
            client,
            token_url,
            client_id,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TokenError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<TokenErrorBody>(&body).ok();
            debug!(status = status.as_u16(), "Token endpoint rejected request");

            return Err(match parsed {
                Some(err) => TokenError::Rejected {
                    status: status.as_u16(),
                    error: err.error,
                    description: err.error_description,
                },
                None => TokenError::Rejected {
                    status: status.as_u16(),
                    error: status
                        .canonical_reason()
                        .unwrap_or("unknown_error")
                        .to_string(),
                    description: (!body.trim().is_empty()).then(|| body.trim().to_string()),
                },
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TokenEndpoint for KeycloakClient {
    async fn password_grant(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<TokenResponse, TokenError> {
        self.request_token(&[
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", username),
            ("password", password.expose_secret().as_str()),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, TokenError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
