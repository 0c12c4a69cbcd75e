//! Authentication module for the Touchstone single sign-on session.
//!
//! This module provides:
//! - `AuthSession`: authenticated HTTP access with automatic re-login
//! - `SessionStore`: the token persisted between runs
//!
//! Logging in presents the PKCS#12 client certificate to the identity
//! provider, so the token is cached on disk until it expires.

mod handshake;
pub mod session;
pub mod store;

pub use session::{load_identity, AuthSession};
pub use store::{SessionData, SessionStore};
