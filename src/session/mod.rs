//! 会话存储
//!
//! 唯一持有凭据的组件：负责持久化、发布当前访问令牌、周期刷新。
//! 其它组件只读 `current_access_token()` / `subscribe()`，不得缓存令牌。
//!
//! 预期内的失败（刷新被拒、令牌损坏）在内部转换为登出；只有 `set_credential` 同时返回错误。

mod refresh;

pub use refresh::{RefreshHandle, RefreshOutcome};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex as TokioMutex};
use tracing::{error, info, warn};

use crate::auth::{Identity, IdentityProjector};
use crate::clients::TokenEndpoint;
use crate::error::{AppError, Result};
use crate::storage::{Credential, DurableStorage, StoredCredential};

/// 默认刷新周期
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

const EVENT_CAPACITY: usize = 32;

/// 登出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// 用户主动登出
    UserRequested,
    /// 身份提供方拒绝了刷新令牌
    RefreshRejected,
    /// 存储中的凭据不完整或令牌无法解码
    CorruptSession,
}

/// 会话事件
///
/// 收到 `LoggedOut` 的界面层必须整体回到根视图，丢弃所有内存状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Refreshed,
    LoggedOut { reason: LogoutReason },
}

/// 新凭据未被接受的原因
pub(crate) enum InstallError {
    /// 访问令牌无法解码，会话已清除
    Corrupt,
    /// 写入存储失败，状态未变
    Storage(AppError),
}

pub(crate) struct SessionInner {
    storage: Arc<dyn DurableStorage>,
    endpoint: Arc<dyn TokenEndpoint>,
    projector: IdentityProjector,
    token_tx: watch::Sender<Option<String>>,
    identity_tx: watch::Sender<Option<Identity>>,
    events: broadcast::Sender<SessionEvent>,
    refresh_interval: Duration,
    /// 所有凭据写入与发布在此锁内完成
    commit_lock: Mutex<()>,
}

impl SessionInner {
    fn commit(&self) -> MutexGuard<'_, ()> {
        self.commit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 身份先于令牌更新，令牌订阅者读到的身份总与令牌一致
    fn publish(&self, token: Option<String>, identity: Option<Identity>) {
        self.identity_tx.send_replace(identity);
        self.token_tx.send_replace(token);
    }

    fn emit(&self, event: SessionEvent) {
        // 没有订阅者时忽略
        let _ = self.events.send(event);
    }

    /// 投影访问令牌；空令牌或无法解码时为 `None`
    fn project(&self, token: &str) -> Option<Identity> {
        match self.projector.project(Some(token)) {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                warn!("Access token is empty");
                None
            }
            Err(e) => {
                warn!(error = %e, "Access token cannot be decoded");
                None
            }
        }
    }

    /// 投影、持久化并发布新凭据
    ///
    /// 令牌无法解码时完整登出，凭据不会落盘。调用方需持有 commit 锁。
    fn install(&self, credential: Credential) -> std::result::Result<(), InstallError> {
        let identity = match self.project(&credential.access_token) {
            Some(identity) => identity,
            None => {
                self.terminate(LogoutReason::CorruptSession);
                return Err(InstallError::Corrupt);
            }
        };

        credential
            .save(self.storage.as_ref())
            .map_err(InstallError::Storage)?;

        self.publish(Some(credential.access_token), Some(identity));
        Ok(())
    }

    /// 清除会话并发布“无令牌”
    ///
    /// 刷新被拒只删除凭据三键；用户登出和会话损坏清空整个存储。
    fn terminate(&self, reason: LogoutReason) {
        let result = match reason {
            LogoutReason::RefreshRejected => Credential::clear(self.storage.as_ref()),
            LogoutReason::UserRequested | LogoutReason::CorruptSession => self.storage.clear(),
        };
        if let Err(e) = result {
            error!(error = %e, ?reason, "Failed to clear session storage");
        }

        self.publish(None, None);
        self.emit(SessionEvent::LoggedOut { reason });
        info!(?reason, "Session ended");
    }
}

pub struct SessionStore {
    inner: Arc<SessionInner>,
    refresher: TokioMutex<Option<RefreshHandle>>,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn DurableStorage>,
        endpoint: Arc<dyn TokenEndpoint>,
        projector: IdentityProjector,
    ) -> Self {
        let (token_tx, _) = watch::channel(None);
        let (identity_tx, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                storage,
                endpoint,
                projector,
                token_tx,
                identity_tx,
                events,
                refresh_interval: DEFAULT_REFRESH_INTERVAL,
                commit_lock: Mutex::new(()),
            }),
            refresher: TokioMutex::new(None),
        }
    }

    /// 设置刷新周期，必须在 `start_auto_refresh` 之前调用
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.refresh_interval = interval,
            None => warn!("Refresh interval can only be changed before the store is shared"),
        }
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// 启动时从持久化存储恢复会话，不发起网络请求，也不检查过期时间
    ///
    /// 恢复的令牌无法解码时完整登出。
    pub fn initialize(&self) {
        let _commit = self.inner.commit();

        match Credential::load(self.inner.storage.as_ref()) {
            StoredCredential::Present(credential) => {
                match self.inner.project(&credential.access_token) {
                    Some(identity) => {
                        info!(expires_at = credential.expires_at, "Restored persisted session");
                        self.inner.publish(Some(credential.access_token), Some(identity));
                    }
                    None => {
                        warn!("Persisted access token is corrupted, discarding session");
                        self.inner.terminate(LogoutReason::CorruptSession);
                    }
                }
            }
            StoredCredential::Absent => {
                self.inner.publish(None, None);
            }
            StoredCredential::Partial => {
                warn!("Persisted credential is incomplete, discarding it");
                if let Err(e) = Credential::clear(self.inner.storage.as_ref()) {
                    error!(error = %e, "Failed to discard incomplete credential");
                }
                self.inner.publish(None, None);
            }
        }
    }

    /// 登录/注册成功后写入凭据并发布新令牌
    ///
    /// 令牌无法解码时完整登出并返回错误；写入失败时状态不变。
    pub fn set_credential(
        &self,
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
    ) -> Result<()> {
        let credential = Credential::new(access_token, refresh_token, expires_in_secs);

        let _commit = self.inner.commit();
        match self.inner.install(credential) {
            Ok(()) => {
                self.inner.emit(SessionEvent::SignedIn);
                Ok(())
            }
            Err(InstallError::Corrupt) => Err(AppError::internal_error(
                "identity provider issued an access token that cannot be decoded",
            )),
            Err(InstallError::Storage(e)) => {
                error!(error = %e, "Failed to persist credential");
                Err(e)
            }
        }
    }

    /// 清空整个存储并发布“无令牌”
    pub fn logout(&self) {
        let _commit = self.inner.commit();
        self.inner.terminate(LogoutReason::UserRequested);
    }

    /// 当前访问令牌；未登录时为 `None`
    pub fn current_access_token(&self) -> Option<String> {
        self.inner.token_tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.token_tx.borrow().is_some()
    }

    /// 订阅访问令牌变化
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.inner.token_tx.subscribe()
    }

    /// 订阅身份变化
    pub fn subscribe_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.identity_tx.subscribe()
    }

    /// 订阅会话事件
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// 持久化的凭据（用于展示过期时间等信息）
    pub fn credential(&self) -> Option<Credential> {
        match Credential::load(self.inner.storage.as_ref()) {
            StoredCredential::Present(credential) => Some(credential),
            _ => None,
        }
    }

    /// 当前令牌投影出的身份，随令牌一起更新
    pub fn current_identity(&self) -> Option<Identity> {
        self.inner.identity_tx.borrow().clone()
    }

    /// 立即执行一次刷新
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.inner.refresh_tick(&tokio_util::sync::CancellationToken::new()).await
    }

    /// 启动周期刷新；已有任务时先停止旧任务
    pub async fn start_auto_refresh(&self) {
        let mut slot = self.refresher.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }

        *slot = Some(RefreshHandle::spawn(self.inner.clone()));
        info!(interval_secs = self.inner.refresh_interval.as_secs(), "Auto refresh started");
    }

    /// 停止周期刷新；返回后不会再有任何存储写入或状态发布
    pub async fn stop_auto_refresh(&self) {
        let handle = self.refresher.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Auto refresh stopped");
        }
    }

    pub async fn is_auto_refresh_running(&self) -> bool {
        self.refresher
            .lock()
            .await
            .as_ref()
            .map(RefreshHandle::is_running)
            .unwrap_or(false)
    }
}
