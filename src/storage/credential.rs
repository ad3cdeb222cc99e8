//! 会话凭据：访问令牌、刷新令牌、过期时间三者同存同删

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use common::TokenResponse;

use super::{DurableStorage, ACCESS_TOKEN_KEY, CREDENTIAL_KEYS, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY};
use crate::error::Result;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// 过期时间（毫秒时间戳），仅供展示，不做主动校验
    pub expires_at: i64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 存储中凭据的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredCredential {
    Absent,
    Present(Credential),
    /// 只有部分键存在，或过期时间无法解析
    Partial,
}

impl Credential {
    pub fn new(access_token: String, refresh_token: String, expires_in_secs: u64) -> Self {
        Self::issued_at(access_token, refresh_token, expires_in_secs, Utc::now())
    }

    pub fn issued_at(
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let lifetime_ms = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);

        Self {
            access_token,
            refresh_token,
            expires_at: now.timestamp_millis().saturating_add(lifetime_ms),
        }
    }

    pub fn from_token_response(resp: TokenResponse) -> Self {
        Self::new(resp.access_token, resp.refresh_token, resp.expires_in)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at).single()
    }

    /// 从存储读取，三个键必须同时存在
    pub fn load(storage: &dyn DurableStorage) -> StoredCredential {
        let access = storage.get(ACCESS_TOKEN_KEY);
        let refresh = storage.get(REFRESH_TOKEN_KEY);
        let expires = storage.get(EXPIRES_AT_KEY);

        match (access, refresh, expires) {
            (None, None, None) => StoredCredential::Absent,
            (Some(access_token), Some(refresh_token), Some(expires)) => {
                match expires.trim().parse::<i64>() {
                    Ok(expires_at) => StoredCredential::Present(Credential {
                        access_token,
                        refresh_token,
                        expires_at,
                    }),
                    Err(_) => StoredCredential::Partial,
                }
            }
            _ => StoredCredential::Partial,
        }
    }

    /// 三个键一次写入，失败时存储保持原样
    pub fn save(&self, storage: &dyn DurableStorage) -> Result<()> {
        let expires_at = self.expires_at.to_string();
        storage.set_many(&[
            (ACCESS_TOKEN_KEY, self.access_token.as_str()),
            (REFRESH_TOKEN_KEY, self.refresh_token.as_str()),
            (EXPIRES_AT_KEY, expires_at.as_str()),
        ])
    }

    /// 只删除凭据三键，保留存储中的其它数据
    pub fn clear(storage: &dyn DurableStorage) -> Result<()> {
        for key in CREDENTIAL_KEYS {
            storage.remove(key)?;
        }
        Ok(())
    }
}
