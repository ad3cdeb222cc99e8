//! 周期令牌刷新任务

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{InstallError, LogoutReason, SessionEvent, SessionInner};
use crate::clients::TokenError;
use crate::storage::{Credential, REFRESH_TOKEN_KEY};

/// 单次刷新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 存储中没有刷新令牌，未发起请求
    Skipped,
    /// 凭据已更新
    Renewed,
    /// 身份提供方拒绝，会话已清除
    Rejected { status: u16 },
    /// 网络失败，状态未变，下个周期重试
    TransportFailed,
    /// 新凭据写入存储失败，状态未变
    StorageFailed,
    /// 新访问令牌无法解码，会话已清除
    Corrupted,
    /// 任务已取消，结果被丢弃
    Cancelled,
}

impl SessionInner {
    pub(crate) async fn refresh_tick(&self, cancel: &CancellationToken) -> RefreshOutcome {
        let refresh_token = match self.storage.get(REFRESH_TOKEN_KEY) {
            Some(token) if !token.is_empty() => token,
            _ => return RefreshOutcome::Skipped,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RefreshOutcome::Cancelled,
            result = self.endpoint.refresh_grant(&refresh_token) => result,
        };

        let _commit = self.commit();
        // 取消后到达的响应不得写入任何状态
        if cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }

        match result {
            Ok(resp) => {
                let credential = Credential::from_token_response(resp);
                let expires_at = credential.expires_at;
                match self.install(credential) {
                    Ok(()) => {
                        debug!(expires_at, "Access token refreshed");
                        self.emit(SessionEvent::Refreshed);
                        RefreshOutcome::Renewed
                    }
                    Err(InstallError::Corrupt) => {
                        warn!("Refreshed access token cannot be decoded, session ended");
                        RefreshOutcome::Corrupted
                    }
                    Err(InstallError::Storage(e)) => {
                        error!(error = %e, "Failed to persist refreshed credential");
                        RefreshOutcome::StorageFailed
                    }
                }
            }
            Err(TokenError::Rejected { status, error, .. }) => {
                warn!(status, error = %error, "Token refresh rejected, ending session");
                self.terminate(LogoutReason::RefreshRejected);
                RefreshOutcome::Rejected { status }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, will retry on next tick");
                RefreshOutcome::TransportFailed
            }
        }
    }
}

/// 刷新任务句柄
///
/// `stop` 等待任务退出。drop 只取消任务，但会等正在进行的提交结束，
/// 之后到达的刷新结果都会被丢弃。
pub struct RefreshHandle {
    inner: Arc<SessionInner>,
    pub(super) cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub(crate) fn spawn(inner: Arc<SessionInner>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(inner.clone(), cancel.clone()));

        Self {
            inner,
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 取消并等待任务退出
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Refresh task panicked");
                }
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        // 提交在锁内检查取消标记，拿到锁后不会再有写入
        drop(self.inner.commit());
    }
}

async fn run(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let period = inner.refresh_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    // 慢请求只会推迟下一次刷新，不会堆积
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = inner.refresh_tick(&cancel).await;
        debug!(?outcome, "Refresh tick finished");

        if outcome == RefreshOutcome::Cancelled {
            break;
        }
    }

    info!("Refresh task exited");
}
