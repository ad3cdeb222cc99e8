//! 外部协作方的 HTTP 客户端

pub mod auth_config;
pub mod catalog_api;
pub mod identity_provider;

pub use auth_config::{fetch_auth_override, AUTH_CONFIG_PATH};
pub use catalog_api::{CatalogApiClient, UploadFile};
pub use identity_provider::{KeycloakClient, TokenEndpoint, TokenError};
