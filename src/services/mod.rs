//! 业务流程服务

pub mod auth_service;

pub use auth_service::AuthService;
