//! Core library for the MIT CovidPass command-line client.
//!
//! - `config`: credentials file and runtime configuration
//! - `auth`: Touchstone login and the persisted session
//! - `api`: endpoint calls and the error taxonomy
//! - `models`: decoded API records

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, Result};
pub use auth::AuthSession;
pub use config::{read_credentials, Config, Credentials, CredentialsError};
