//! 统一错误模型
//! 会话核心对预期失败内部消化（登出），这里的错误只面向登录流程与目录 API 的调用方

use common::ApiErrorBody;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// 用户名或密码错误（身份提供方返回 invalid_grant）
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// 对应的 HTTP 状态码（没有对应状态时为 0）
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::InvalidCredentials | AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Api { status, .. } => *status,
            AppError::Config(_)
            | AppError::Network(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => 0,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::InvalidCredentials => "Invalid username or password".to_string(),
            AppError::Unauthorized => "Please sign in to continue".to_string(),
            AppError::Forbidden => "Access denied".to_string(),
            AppError::NotFound(msg) => format!("Not found: {}", msg),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Api { .. } => "The server could not process the request".to_string(),
            AppError::Network(_) => "Service unavailable, please try again later".to_string(),
            AppError::Storage(_) => "Local storage error".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }

    pub fn code(&self) -> u16 {
        self.status_code()
    }

    /// 按状态码归类目录后端的失败响应
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|b| b.text().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            401 => AppError::Unauthorized,
            403 => AppError::Forbidden,
            404 => AppError::NotFound(message),
            409 => AppError::Conflict(message),
            400 | 422 => AppError::Validation(message),
            _ => AppError::Api { status, message },
        }
    }

    // 便捷方法
    pub fn validation(msg: &str) -> Self {
        AppError::Validation(msg.to_string())
    }

    pub fn network(msg: &str) -> Self {
        AppError::Network(msg.to_string())
    }

    pub fn storage(msg: &str) -> Self {
        AppError::Storage(msg.to_string())
    }

    pub fn internal_error(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Network(format!("request timed out: {}", e))
        } else if e.is_decode() {
            AppError::Internal(format!("unexpected response body: {}", e))
        } else {
            AppError::Network(e.to_string())
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = e
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let reason = errors
                    .iter()
                    .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}
