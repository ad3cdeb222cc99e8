//! 外部协作方的消息协议定义
//!
//! 身份提供方（OpenID Connect token 端点）与目录后端 REST API 的请求/响应结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token 端点成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// 访问令牌
    pub access_token: String,

    /// 刷新令牌
    pub refresh_token: String,

    /// 访问令牌有效期（秒）
    pub expires_in: u64,

    /// 刷新令牌有效期（秒，部分身份提供方返回）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Token 端点失败响应体（OAuth2 错误格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenErrorBody {
    /// 错误码，例如 `invalid_grant`
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// OAuth2 错误码：凭据或刷新令牌无效
pub const INVALID_GRANT: &str = "invalid_grant";

/// 运行时认证配置（`/auth-config.json`），所有字段可选
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigOverride {
    #[serde(default)]
    pub keycloak_url: Option<String>,

    #[serde(default)]
    pub realm: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,
}

/// 房屋模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseTemplate {
    pub id: i64,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    pub price: f64,

    /// 建筑面积（平方米）
    pub area: f64,

    pub floors: u32,

    pub rooms: u32,

    /// 附件（图片、图纸）
    #[serde(default)]
    pub files: Vec<TemplateFile>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// 模板附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFile {
    pub id: i64,

    pub file_name: String,

    /// 下载地址
    pub url: String,

    #[serde(default)]
    pub content_type: Option<String>,
}

/// 创建/更新模板请求体（multipart 中的 `template` 部分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub price: f64,

    pub area: f64,

    pub floors: u32,

    pub rooms: u32,
}

/// 用户资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,

    pub username: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

/// 用户资料更新请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// 购买咨询（application）请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub template_id: i64,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 购买咨询创建结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub id: i64,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// 注册请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub username: String,

    pub email: String,

    pub password: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// 后端错误响应体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    /// 取可展示的错误文本
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
