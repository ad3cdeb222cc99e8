//! 进程内存储，用于测试和不需要跨进程保留会话的场景

use dashmap::DashMap;

use super::DurableStorage;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}
