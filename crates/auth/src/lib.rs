//! Minimal token verification for the alert-stream API surface. Account
//! lifecycle — registration, password resets, role management — is out
//! of scope; this crate only answers "who is this bearer token for, and
//! which organization do they belong to".

pub mod verifier;

pub use verifier::{AuthenticatedUser, AuthError, JwtTokenVerifier, TokenVerifier};
