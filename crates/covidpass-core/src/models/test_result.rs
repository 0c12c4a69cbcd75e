use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::warn;

use super::decode::{decode_list, DecodeError, Fields};

/// Lab result code. Codes the portal has never been seen to send are kept
/// verbatim in `Unknown` instead of failing the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
    Negative,
    Positive,
    Invalid,
    Unknown(String),
}

impl ResultCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "N" => Self::Negative,
            "P" => Self::Positive,
            "I" => Self::Invalid,
            other => {
                warn!(code = %other, "Unrecognized test result code");
                Self::Unknown(other.to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Negative => "N",
            Self::Positive => "P",
            Self::Invalid => "I",
            Self::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub test_guid: String,
    /// `None` while the sample is still being processed.
    pub result: Option<ResultCode>,
    pub can_download: bool,
    pub test_company: Option<String>,
    pub test_date: Option<DateTime<Local>>,
}

impl TestResult {
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let fields = Fields::new("TestResult", value)?;
        Ok(Self {
            test_guid: fields.required_str("test_guid")?,
            result: fields.optional_str("result")?.as_deref().map(ResultCode::parse),
            can_download: fields.required_bool("can_download")?,
            test_company: fields.optional_str("test_company")?,
            test_date: fields.optional_datetime("test_date")?,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.result.is_none()
    }
}

/// Decode the results list, most recent first as the API sends it.
pub fn decode_test_results(body: &Value) -> Result<Vec<TestResult>, DecodeError> {
    decode_list("TestResults", body, TestResult::from_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_results_in_api_order() {
        let body = json!([
            {"test_guid": "b", "result": null, "can_download": false, "test_company": null, "test_date": "2021-09-03T09:00:00"},
            {"test_guid": "a", "result": "N", "can_download": true, "test_company": "Broad", "test_date": "2021-09-01T09:00:00"}
        ]);

        let results = decode_test_results(&body).expect("valid results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_guid, "b");
        assert!(results[0].is_pending());
        assert_eq!(results[1].result, Some(ResultCode::Negative));
        assert_eq!(results[1].test_company.as_deref(), Some("Broad"));
        assert_eq!(
            results[1].test_date.map(|d| d.format("%Y-%m-%d").to_string()).as_deref(),
            Some("2021-09-01")
        );
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let value = json!({"test_guid": "x", "result": "Q", "can_download": false});
        let result = TestResult::from_json(&value).expect("unknown codes are not errors");
        assert_eq!(result.result, Some(ResultCode::Unknown("Q".to_string())));
        assert_eq!(result.result.as_ref().map(ResultCode::as_str), Some("Q"));
        assert!(result.test_company.is_none());
        assert!(result.test_date.is_none());
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(ResultCode::parse("P"), ResultCode::Positive);
        assert_eq!(ResultCode::parse("I"), ResultCode::Invalid);
        assert_eq!(ResultCode::parse("N").as_str(), "N");
    }

    #[test]
    fn test_missing_guid() {
        let value = json!({"result": "N", "can_download": true});
        assert!(matches!(
            TestResult::from_json(&value),
            Err(DecodeError::MissingField { field: "test_guid", .. })
        ));
    }
}
