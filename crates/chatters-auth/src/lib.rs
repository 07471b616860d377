//! # chatters-auth
//!
//! Credential handling for the HTTP and WebSocket boundary.
//!
//! - [`JwtAuthority`] issues HS256 bearer tokens and implements
//!   [`chatters_core::AuthValidator`] for the upgrade handshake and the
//!   protected REST routes.
//! - [`password`] wraps bcrypt hashing and verification.

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;
pub mod password;

pub use errors::CredentialError;
pub use jwt::{Claims, JwtAuthority};
pub use password::{hash_password, verify_password};
