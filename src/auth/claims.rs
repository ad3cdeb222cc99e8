//! 身份提供方签发的访问令牌声明
//!
//! 客户端只读取载荷用于界面展示，不校验签名。所有改变状态的请求由后端校验令牌。

use std::collections::HashMap;

use jsonwebtoken::{decode, errors::Error as JwtError, DecodingKey, Validation};
use serde::{Deserialize, Deserializer};

/// `realm_access` 与 `resource_access.<client>` 中的角色列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleClaim {
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
}

/// 访问令牌中的声明
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessClaims {
    /// 用户 ID
    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Realm 级角色
    #[serde(default)]
    pub realm_access: Option<RoleClaim>,

    /// 按 client id 区分的 client 级角色
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_access: HashMap<String, RoleClaim>,

    /// 顶层角色（自定义 protocol mapper）
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,

    /// 过期时间
    #[serde(default)]
    pub exp: Option<i64>,
}

/// `null` 与缺省同样处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 解码载荷，不检查签名、过期时间和受众
pub fn decode_unverified(token: &str) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
}
