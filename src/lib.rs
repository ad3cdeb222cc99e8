//! 房屋模板目录客户端库
//! 会话生命周期、身份投影以及对身份提供方和目录后端的调用

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod storage;
pub mod telemetry;
