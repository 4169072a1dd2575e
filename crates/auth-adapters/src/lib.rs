//! crates/auth-adapters/src/lib.rs
//!
//! Identity providers behind the `AuthProvider` port.

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::{Claims, JwtAuthProvider};
