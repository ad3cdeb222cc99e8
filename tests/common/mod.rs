//! 测试公共模块
//! 提供假的 token 端点、令牌生成和存根服务器

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use ::common::TokenResponse;
use house_catalog::{
    auth::IdentityProjector,
    clients::{TokenEndpoint, TokenError},
    config::{DEFAULT_ADMIN_ROLE, DEFAULT_MANAGER_ROLE},
    error::{AppError, Result as AppResult},
    session::SessionStore,
    storage::{DurableStorage, MemoryStorage},
};
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::{ExposeSecret, Secret};
use tokio::sync::Notify;

pub const CLIENT_ID: &str = "hackathon-frontend";

/// 签发测试令牌（签名密钥随意，客户端不校验签名）
pub fn mint_token(claims: serde_json::Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-signing-key"))
        .expect("Failed to encode test token")
}

/// 以用户名为唯一声明的访问令牌，相同用户名得到相同令牌
pub fn access_token(username: &str) -> String {
    mint_token(serde_json::json!({ "preferred_username": username }))
}

pub fn tokens(access: &str, refresh: &str, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_in,
        refresh_expires_in: None,
        token_type: Some("Bearer".to_string()),
        scope: None,
    }
}

/// 预设的端点应答
#[derive(Clone)]
pub enum FakeReply {
    Tokens(TokenResponse),
    Reject { status: u16, error: String },
    Transport,
}

impl FakeReply {
    pub fn reject(status: u16, error: &str) -> Self {
        FakeReply::Reject {
            status,
            error: error.to_string(),
        }
    }

    fn into_result(self) -> Result<TokenResponse, TokenError> {
        match self {
            FakeReply::Tokens(t) => Ok(t),
            FakeReply::Reject { status, error } => Err(TokenError::Rejected {
                status,
                error,
                description: None,
            }),
            FakeReply::Transport => Err(TokenError::Transport("connection refused".to_string())),
        }
    }
}

/// 假的 token 端点：按顺序返回预设应答，队列耗尽后返回最后一个
pub struct FakeTokenEndpoint {
    replies: Mutex<VecDeque<FakeReply>>,
    last: Mutex<FakeReply>,
    pub refresh_calls: AtomicUsize,
    pub password_calls: AtomicUsize,
    pub seen_refresh_tokens: Mutex<Vec<String>>,
    pub seen_logins: Mutex<Vec<(String, String)>>,
    /// 设置后，每次调用先通知 `entered` 再等待 `release`
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeTokenEndpoint {
    pub fn new(replies: Vec<FakeReply>) -> Self {
        let last = replies.last().cloned().unwrap_or(FakeReply::Transport);
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            refresh_calls: AtomicUsize::new(0),
            password_calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
            seen_logins: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn always(reply: FakeReply) -> Self {
        Self::new(vec![reply])
    }

    /// 调用会阻塞直到 `release` 被通知
    pub fn gated(reply: FakeReply, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        let mut endpoint = Self::always(reply);
        endpoint.gate = Some((entered, release));
        endpoint
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn password_count(&self) -> usize {
        self.password_calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<TokenResponse, TokenError> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        let reply = {
            let mut queue = self.replies.lock().unwrap();
            match queue.pop_front() {
                Some(reply) => {
                    *self.last.lock().unwrap() = reply.clone();
                    reply
                }
                None => self.last.lock().unwrap().clone(),
            }
        };
        reply.into_result()
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn password_grant(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<TokenResponse, TokenError> {
        self.password_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_logins
            .lock()
            .unwrap()
            .push((username.to_string(), password.expose_secret().clone()));
        self.next().await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, TokenError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        self.next().await
    }
}

pub fn projector() -> IdentityProjector {
    IdentityProjector::new(CLIENT_ID, DEFAULT_ADMIN_ROLE, DEFAULT_MANAGER_ROLE)
}

/// 创建测试用会话存储
pub fn create_store<S: DurableStorage + 'static>(
    storage: Arc<S>,
    endpoint: Arc<FakeTokenEndpoint>,
) -> SessionStore {
    SessionStore::new(storage, endpoint, projector())
}

/// 可注入写失败的内存存储
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    /// 还剩几次 `set` 后失败；`None` 表示不失败
    fail_in: Mutex<Option<usize>>,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            fail_in: Mutex::new(None),
        }
    }

    /// 第 `nth` 次 `set`（从 1 开始）失败，之后恢复正常
    pub fn fail_on_write(&self, nth: usize) {
        *self.fail_in.lock().unwrap() = Some(nth);
    }
}

impl DurableStorage for FlakyStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut fail_in = self.fail_in.lock().unwrap();
        match *fail_in {
            Some(1) => {
                *fail_in = None;
                Err(AppError::storage("disk full"))
            }
            Some(n) => {
                *fail_in = Some(n - 1);
                self.inner.set(key, value)
            }
            None => self.inner.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.inner.remove(key)
    }

    fn clear(&self) -> AppResult<()> {
        self.inner.clear()
    }
}

/// 在随机端口上启动存根服务器
pub async fn spawn_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Stub server has no address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Stub server failed");
    });

    addr
}
