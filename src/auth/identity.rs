//! 身份投影：访问令牌 -> 界面使用的身份信息
//!
//! 纯函数，不做 I/O。解码失败由调用方按会话损坏处理（完整登出）。

use std::collections::BTreeSet;

use thiserror::Error;

use super::claims::{decode_unverified, AccessClaims};
use crate::config::AppConfig;

/// 取不到用户名时使用的显示名
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// 当前用户的身份视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub email: String,
    /// 去重后的角色集合
    pub roles: BTreeSet<String>,
    /// 拥有管理员或经理角色
    pub is_privileged: bool,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("access token payload could not be decoded: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone)]
pub struct IdentityProjector {
    client_id: String,
    admin_role: String,
    manager_role: String,
}

impl IdentityProjector {
    pub fn new(
        client_id: impl Into<String>,
        admin_role: impl Into<String>,
        manager_role: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            admin_role: admin_role.into(),
            manager_role: manager_role.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.identity.client_id.clone(),
            config.roles.admin.clone(),
            config.roles.manager.clone(),
        )
    }

    /// 无令牌 -> `Ok(None)`；令牌无法解码 -> `Err`
    pub fn project(&self, token: Option<&str>) -> Result<Option<Identity>, ProjectionError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };

        let claims = decode_unverified(token)?;
        Ok(Some(self.identity_from_claims(claims)))
    }

    pub fn identity_from_claims(&self, claims: AccessClaims) -> Identity {
        let display_name = non_empty(claims.preferred_username)
            .or_else(|| non_empty(claims.name))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let email = claims.email.unwrap_or_default();

        // 三处角色来源取并集
        let mut roles = BTreeSet::new();
        if let Some(realm) = claims.realm_access {
            roles.extend(realm.roles);
        }
        if let Some(client) = claims.resource_access.get(&self.client_id) {
            roles.extend(client.roles.iter().cloned());
        }
        roles.extend(claims.roles);

        let is_privileged = roles.contains(&self.admin_role) || roles.contains(&self.manager_role);

        Identity {
            display_name,
            email,
            roles,
            is_privileged,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
