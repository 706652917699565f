mod claims;
mod jwt;
mod service;

pub use claims::Claims;
pub use jwt::JwtValidator;
pub use service::{AuthError, AuthService, Identity, JwtAuthService, Uid};
