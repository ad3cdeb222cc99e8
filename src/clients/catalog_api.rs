//! 目录后端 REST API 客户端
//!
//! 每次调用时从会话存储读取当前令牌，不自行缓存。后端返回的 401/403
//! 只转换为错误交给调用方，不会反馈给会话存储。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{
    ApplicationRequest, ApplicationResponse, HouseTemplate, ProfileUpdate, RegistrationRequest,
    TemplatePayload, UserProfile,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{AppError, Result};
use crate::session::SessionStore;

/// 待上传的附件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// 读取本地文件，按扩展名推断类型
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::validation("file path has no file name"))?;

        Ok(Self::new(file_name, content_type_for(path), bytes))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "dwg" => "application/acad",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

pub struct CatalogApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl CatalogApiClient {
    pub fn new(config: &ApiConfig, timeout: Duration, session: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, config.base_url.clone(), session))
    }

    pub fn with_client(client: Client, base_url: String, session: Arc<SessionStore>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 附加 bearer 令牌；`required` 时未登录直接返回 `Unauthorized`
    fn authorize(&self, request: RequestBuilder, required: bool) -> Result<RequestBuilder> {
        match self.session.current_access_token() {
            Some(token) => Ok(request.bearer_auth(token)),
            None if required => Err(AppError::Unauthorized),
            None => Ok(request),
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Catalog API response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status.as_u16(), &body));
        }

        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.execute(request).await?.json::<T>().await?)
    }

    /// 模板列表（匿名可访问）
    pub async fn list_templates(&self) -> Result<Vec<HouseTemplate>> {
        let request = self.authorize(self.client.get(self.url("/api/templates")), false)?;
        self.fetch(request).await
    }

    pub async fn get_template(&self, id: i64) -> Result<HouseTemplate> {
        let request =
            self.authorize(self.client.get(self.url(&format!("/api/templates/{}", id))), false)?;
        self.fetch(request).await
    }

    pub async fn create_template(
        &self,
        payload: &TemplatePayload,
        files: Vec<UploadFile>,
    ) -> Result<HouseTemplate> {
        let form = template_form(payload, files)?;
        let request = self.authorize(self.client.post(self.url("/api/templates")), true)?;
        self.fetch(request.multipart(form)).await
    }

    pub async fn update_template(
        &self,
        id: i64,
        payload: &TemplatePayload,
        files: Vec<UploadFile>,
    ) -> Result<HouseTemplate> {
        let form = template_form(payload, files)?;
        let request =
            self.authorize(self.client.put(self.url(&format!("/api/templates/{}", id))), true)?;
        self.fetch(request.multipart(form)).await
    }

    pub async fn delete_template(&self, id: i64) -> Result<()> {
        let request =
            self.authorize(self.client.delete(self.url(&format!("/api/templates/{}", id))), true)?;
        self.execute(request).await.map(|_| ())
    }

    /// 删除模板的单个附件
    pub async fn delete_file(&self, file_id: i64) -> Result<()> {
        let request =
            self.authorize(self.client.delete(self.url(&format!("/api/files/{}", file_id))), true)?;
        self.execute(request).await.map(|_| ())
    }

    pub async fn get_profile(&self) -> Result<UserProfile> {
        let request = self.authorize(self.client.get(self.url("/api/users/me")), true)?;
        self.fetch(request).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let request = self.authorize(self.client.put(self.url("/api/users/me")), true)?;
        self.fetch(request.json(update)).await
    }

    /// 提交购买咨询
    pub async fn create_application(
        &self,
        application: &ApplicationRequest,
    ) -> Result<ApplicationResponse> {
        let request = self.authorize(self.client.post(self.url("/api/applications")), true)?;
        self.fetch(request.json(application)).await
    }

    /// 注册新用户（无需令牌）
    pub async fn register(&self, registration: &RegistrationRequest) -> Result<()> {
        let request = self
            .client
            .post(self.url("/api/auth/register"))
            .json(registration);
        self.execute(request).await.map(|_| ())
    }
}

fn template_form(payload: &TemplatePayload, files: Vec<UploadFile>) -> Result<Form> {
    let json = serde_json::to_string(payload)
        .map_err(|e| AppError::internal_error(&format!("failed to encode template: {}", e)))?;

    let mut form = Form::new().part(
        "template",
        Part::text(json)
            .mime_str("application/json")
            .map_err(|e| AppError::internal_error(&e.to_string()))?,
    );

    for file in files {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| AppError::validation(&format!("invalid content type: {}", e)))?;
        form = form.part("files", part);
    }

    Ok(form)
}
