//! 认证服务：登录、注册后登录

use std::sync::Arc;

use secrecy::Secret;
use tracing::{info, warn};
use validator::Validate;

use crate::clients::{CatalogApiClient, TokenEndpoint, TokenError};
use crate::error::{AppError, Result};
use crate::models::{LoginForm, RegistrationForm};
use crate::session::SessionStore;

pub struct AuthService {
    endpoint: Arc<dyn TokenEndpoint>,
    session: Arc<SessionStore>,
}

impl AuthService {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, session: Arc<SessionStore>) -> Self {
        Self { endpoint, session }
    }

    /// 用户登录
    ///
    /// 失败时不改动已有的凭据。
    pub async fn sign_in(&self, form: &LoginForm) -> Result<()> {
        form.validate()?;

        let username = form.username.trim();
        let password = Secret::new(form.password.clone());

        let tokens = self
            .endpoint
            .password_grant(username, &password)
            .await
            .map_err(|e| map_login_error(username, e))?;

        self.session
            .set_credential(tokens.access_token, tokens.refresh_token, tokens.expires_in)?;

        info!(username = %username, "Signed in");
        Ok(())
    }

    /// 注册新用户后立即登录
    pub async fn register_and_sign_in(
        &self,
        api: &CatalogApiClient,
        form: &RegistrationForm,
    ) -> Result<()> {
        form.validate()?;

        api.register(&form.to_request()).await?;
        info!(username = %form.username.trim(), "Registered new user");

        self.sign_in(&form.login_form()).await
    }
}

fn map_login_error(username: &str, e: TokenError) -> AppError {
    match e {
        e if e.is_invalid_grant() => {
            warn!(username = %username, "Login rejected: invalid credentials");
            AppError::InvalidCredentials
        }
        TokenError::Rejected { status: 401, .. } => AppError::InvalidCredentials,
        TokenError::Rejected { status, error, .. } => {
            warn!(username = %username, status, error = %error, "Login rejected");
            AppError::Api {
                status,
                message: error,
            }
        }
        TokenError::Transport(msg) => {
            warn!(error = %msg, "Identity provider unreachable");
            AppError::Network(msg)
        }
        TokenError::InvalidResponse(msg) => AppError::Internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_login_error() {
        let invalid = TokenError::Rejected {
            status: 400,
            error: "invalid_grant".to_string(),
            description: None,
        };
        assert!(matches!(map_login_error("u", invalid), AppError::InvalidCredentials));

        let unauthorized = TokenError::Rejected {
            status: 401,
            error: "unauthorized_client".to_string(),
            description: None,
        };
        assert!(matches!(map_login_error("u", unauthorized), AppError::InvalidCredentials));

        let server = TokenError::Rejected {
            status: 503,
            error: "Service Unavailable".to_string(),
            description: None,
        };
        assert!(matches!(
            map_login_error("u", server),
            AppError::Api { status: 503, .. }
        ));

        assert!(matches!(
            map_login_error("u", TokenError::Transport("refused".to_string())),
            AppError::Network(_)
        ));
    }
}
