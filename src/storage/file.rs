//! 基于 JSON 文件的持久化存储
//!
//! 整张表保存在一个 JSON 对象文件中。每次修改先写临时文件再 rename，
//! 进程崩溃时不会留下写了一半的文件。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::DurableStorage;
use crate::error::{AppError, Result};

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// 打开存储文件；文件不存在视为空表
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    // 损坏的文件按空表处理，下一次写入会覆盖它
                    warn!(path = %path.display(), error = %e, "Session storage file is corrupted, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened session storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::storage("session storage lock poisoned"))
    }

    /// 在副本上修改并落盘，写盘成功后才替换内存中的表
    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut entries = self.lock()?;
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }

        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.update(|entries| {
            entries.clear();
            true
        })
    }

    /// 整张表只落盘一次
    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value.to_string());
            }
            true
        })
    }
}
