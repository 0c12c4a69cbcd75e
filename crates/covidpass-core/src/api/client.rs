//! Calls against the fixed CovidPass endpoints.
//!
//! Fetch functions fail with `ApiError::Endpoint` on a non-2xx status and
//! with `ApiError::Decode` when the body does not have the expected shape.
//! Submit functions return the raw response for the caller to inspect.

use std::collections::BTreeMap;

use reqwest::Response;
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiError, Result};
use crate::auth::AuthSession;
use crate::models::{
    decode_locations, decode_requirements, decode_test_results, DecodeError, Location,
    Requirement, TestResult,
};

// ============================================================================
// Endpoints
// ============================================================================

const ACCESS_STATUS_PATH: &str = "/pass-v1/pass/access_status";
const QUEUE_TIMES_PATH: &str = "/pass-v1/pass/medical/queue_times";
const TEST_RESULTS_PATH: &str = "/medical-v1/tests/results";
const UNOBSERVED_COMPLETE_PATH: &str = "/medical-v1/unobserved/complete";
const ATTESTATIONS_PATH: &str = "/pass-v1/pass/attestations";

/// `medical_test_type` for observed tests only, and for observed plus self tests.
const TEST_TYPE_OBSERVED: u8 = 1;
const TEST_TYPE_WITH_SELF_TEST: u8 = 2;

/// Attestation question ids, from `pass/questions?new=1`.
const QUESTION_SYMPTOMS: &str = "14";
const QUESTION_POSITIVE: &str = "18";
const QUESTION_FOLLOW_RULES: &str = "16";

/// Prefix printed on the at-home test tube labels.
const BARCODE_PREFIX: &str = "D-";

/// Check if response is successful, returning an error with body if not.
async fn check_response(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let url = response.url().to_string();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::connectivity(&url, e))?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(DecodeError::Json(e)))
}

/// Fetch campus-access requirements keyed by id (`medical`, `attestation`, ...).
pub async fn fetch_requirements(
    session: &mut AuthSession,
) -> Result<BTreeMap<String, Requirement>> {
    let url = session.config().api_url(ACCESS_STATUS_PATH);
    let response = check_response(session.get(&url, None).await?).await?;
    let requirements = decode_requirements(&read_json(response).await?)?;
    debug!(count = requirements.len(), "Fetched requirements");
    Ok(requirements)
}

/// Fetch testing sites for the next `days` days.
pub async fn fetch_locations(
    session: &mut AuthSession,
    days: u32,
    include_self_test: bool,
) -> Result<Vec<Location>> {
    let url = session.config().api_url(QUEUE_TIMES_PATH);
    let test_type = if include_self_test {
        TEST_TYPE_WITH_SELF_TEST
    } else {
        TEST_TYPE_OBSERVED
    };
    let params = [
        ("number_of_days", days.to_string()),
        ("medical_test_type", test_type.to_string()),
    ];
    let response = check_response(session.get(&url, Some(&params[..])).await?).await?;
    let locations = decode_locations(&read_json(response).await?)?;
    debug!(count = locations.len(), days, "Fetched locations");
    Ok(locations)
}

/// Fetch test results, most recent first.
pub async fn fetch_test_results(session: &mut AuthSession) -> Result<Vec<TestResult>> {
    let url = session.config().api_url(TEST_RESULTS_PATH);
    let params = [("optional", "medical".to_string())];
    let response = check_response(session.get(&url, Some(&params[..])).await?).await?;
    let results = decode_test_results(&read_json(response).await?)?;
    debug!(count = results.len(), "Fetched test results");
    Ok(results)
}

/// Report an at-home test by the digits after `D-` on its label.
pub async fn submit_medical(session: &mut AuthSession, code: &str) -> Result<Response> {
    let url = session.config().api_url(UNOBSERVED_COMPLETE_PATH);
    let body = json!({ "barcode": format!("{BARCODE_PREFIX}{code}") });
    session.post(&url, &body).await
}

/// Submit the daily attestation questionnaire.
pub async fn submit_attestation(
    session: &mut AuthSession,
    symptoms: bool,
    positive: bool,
    follow_rules: bool,
) -> Result<Response> {
    let url = session.config().api_url(ATTESTATIONS_PATH);
    let body = json!({
        "answers": [
            { "id": QUESTION_SYMPTOMS, "checked": symptoms },
            { "id": QUESTION_POSITIVE, "checked": positive },
            { "id": QUESTION_FOLLOW_RULES, "checked": follow_rules },
        ],
    });
    session.post(&url, &body).await
}
