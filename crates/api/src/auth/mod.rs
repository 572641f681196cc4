//! Authentication module for Fakturace

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod sessions;
pub mod tokens;

pub use jwt::{Claims, IssuedToken, JwtError, JwtManager};
pub use middleware::{require_admin, require_auth, AuthState, AuthUser};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use tokens::{TokenError, TokenManager, TokenType as VerificationTokenType};
