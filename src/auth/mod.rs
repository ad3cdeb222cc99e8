//! 认证模块
//! 访问令牌解码与身份投影

pub mod claims;
pub mod identity;

pub use claims::{decode_unverified, AccessClaims, RoleClaim};
pub use identity::{Identity, IdentityProjector, ProjectionError, DEFAULT_DISPLAY_NAME};
