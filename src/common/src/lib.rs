//! Common types shared between the session core, the HTTP clients and tests

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod messages;

// 重新导出常用的类型和常量
pub use messages::{
    ApiErrorBody,
    ApplicationRequest,
    ApplicationResponse,
    // 运行时配置
    AuthConfigOverride,
    // 目录后端
    HouseTemplate,
    ProfileUpdate,
    RegistrationRequest,
    TemplateFile,
    TemplatePayload,
    // 身份提供方
    TokenErrorBody,
    TokenResponse,
    UserProfile,
    INVALID_GRANT,
};
