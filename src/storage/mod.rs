//! 持久化客户端存储
//!
//! 扁平的字符串键值表，同步读写。会话凭据以三个键保存：
//! `access_token`、`refresh_token`、`expires_at`（毫秒时间戳）。

pub mod credential;
pub mod file;
pub mod memory;

pub use credential::{Credential, StoredCredential};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use tracing::error;

use crate::error::Result;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "expires_at";

/// 凭据使用的全部键
pub const CREDENTIAL_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY];

/// 持久化键值存储
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// 清空整个存储（不仅是凭据）
    fn clear(&self) -> Result<()>;

    /// 一次写入多个键，要么全部生效要么全部不生效
    ///
    /// 默认实现逐个写入，失败时把已写入的键恢复为原值。
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let snapshot: Vec<(&str, Option<String>)> =
            entries.iter().map(|(key, _)| (*key, self.get(key))).collect();

        for (written, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = self.set(key, value) {
                for (key, previous) in snapshot.iter().take(written + 1).rev() {
                    let restored = match previous {
                        Some(previous) => self.set(key, previous),
                        None => self.remove(key),
                    };
                    if let Err(rollback) = restored {
                        error!(key = %key, error = %rollback, "Failed to roll back partial write");
                    }
                }
                return Err(e);
            }
        }

        Ok(())
    }
}
