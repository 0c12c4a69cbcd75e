//! CovidPass REST API.
//!
//! Fetch functions decode the fixed `api.mit.edu` endpoints into typed
//! records; submit functions hand the raw response back to the caller.
//! All calls go through an `AuthSession`.

pub mod client;
pub mod error;

pub use client::{
    fetch_locations, fetch_requirements, fetch_test_results, submit_attestation, submit_medical,
};
pub use error::{ApiError, Result};
