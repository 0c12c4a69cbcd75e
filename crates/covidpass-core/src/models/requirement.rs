//! Access requirements reported by `pass/access_status`.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde_json::Value;

use super::decode::{decode_list, DecodeError, Fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStatus {
    Complete,
    DueSoon,
    Incomplete,
    Pending,
}

impl RequirementStatus {
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        match value {
            "complete" => Ok(Self::Complete),
            "due_soon" => Ok(Self::DueSoon),
            "incomplete" => Ok(Self::Incomplete),
            "pending" => Ok(Self::Pending),
            other => Err(DecodeError::InvalidStatus(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::DueSoon => "due_soon",
            Self::Incomplete => "incomplete",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One campus-access requirement (e.g. `medical`, `attestation`).
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub id: String,
    pub title_web: String,
    pub title_mobile: String,
    pub required: bool,
    pub visible: bool,
    pub medical_awaiting_test_outcome: bool,
    pub status: RequirementStatus,
    pub last_completion: Option<DateTime<Local>>,
    pub next_completion: Option<DateTime<Local>>,
    pub prerequisites: Option<Vec<String>>,
}

impl Requirement {
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let fields = Fields::new("Requirement", value)?;
        Ok(Self {
            id: fields.required_str("id")?,
            title_web: fields.required_str("title_web")?,
            title_mobile: fields.required_str("title_mobile")?,
            required: fields.required_bool("required")?,
            visible: fields.required_bool("visible")?,
            medical_awaiting_test_outcome: fields
                .optional_bool("medical_awaiting_test_outcome")?
                .unwrap_or(false),
            status: RequirementStatus::parse(&fields.required_str("status")?)?,
            last_completion: fields.optional_datetime("last_completion")?,
            next_completion: fields.optional_datetime("next_completion")?,
            prerequisites: fields.optional_str_list("prerequisites")?,
        })
    }

    /// Whether the requirement has lapsed as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Local>) -> bool {
        self.next_completion.map(|next| next < now).unwrap_or(false)
    }
}

/// Decode the `{"requirements": [...]}` envelope into a map keyed by id.
pub fn decode_requirements(body: &Value) -> Result<BTreeMap<String, Requirement>, DecodeError> {
    Fields::new("AccessStatus", body)?;
    let list = body
        .get("requirements")
        .ok_or(DecodeError::MissingField {
            record: "AccessStatus",
            field: "requirements",
        })?;

    let requirements = decode_list("AccessStatus", list, Requirement::from_json)?;
    Ok(requirements.into_iter().map(|r| (r.id.clone(), r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn medical() -> Value {
        json!({
            "id": "medical",
            "title_web": "COVID Test",
            "title_mobile": "Test",
            "required": true,
            "visible": true,
            "medical_awaiting_test_outcome": false,
            "status": "complete",
            "last_completion": "2021-09-01T10:00:00-04:00",
            "next_completion": "2021-09-05T10:00:00-04:00",
            "prerequisites": ["attestation"]
        })
    }

    #[test]
    fn test_decode_full_requirement() {
        let r = Requirement::from_json(&medical()).expect("valid requirement");
        assert_eq!(r.id, "medical");
        assert_eq!(r.status, RequirementStatus::Complete);
        assert_eq!(r.prerequisites.as_deref(), Some(&["attestation".to_string()][..]));
        let next = r.next_completion.expect("next_completion set");
        assert_eq!(
            next,
            DateTime::parse_from_rfc3339("2021-09-05T14:00:00Z")
                .unwrap()
                .with_timezone(&Local)
        );
    }

    #[test]
    fn test_missing_next_completion_is_none() {
        let mut value = medical();
        let map = value.as_object_mut().unwrap();
        map.remove("next_completion");
        map.remove("prerequisites");
        map.remove("medical_awaiting_test_outcome");
        map.insert("last_completion".into(), Value::Null);

        let r = Requirement::from_json(&value).expect("absent optional fields are valid");
        assert!(r.next_completion.is_none());
        assert!(r.last_completion.is_none());
        assert!(r.prerequisites.is_none());
        assert!(!r.medical_awaiting_test_outcome);
        assert!(!r.is_expired_at(Local::now()));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut value = medical();
        value["status"] = json!("overdue");
        assert!(matches!(
            Requirement::from_json(&value),
            Err(DecodeError::InvalidStatus(s)) if s == "overdue"
        ));
    }

    #[test]
    fn test_decode_requirements_envelope() {
        let mut attestation = medical();
        attestation["id"] = json!("attestation");
        attestation["status"] = json!("due_soon");
        let body = json!({"requirements": [medical(), attestation], "status": "access_granted"});

        let map = decode_requirements(&body).expect("valid envelope");
        assert_eq!(map.len(), 2);
        assert_eq!(map["attestation"].status, RequirementStatus::DueSoon);
        assert_eq!(map["medical"].title_web, "COVID Test");
    }

    #[test]
    fn test_bad_timestamp_fails_whole_response() {
        let mut broken = medical();
        broken["id"] = json!("attestation");
        broken["next_completion"] = json!("2021-09-05T10:00");
        broken["last_completion"] = json!("not a date");
        let body = json!({"requirements": [medical(), broken]});

        assert!(matches!(
            decode_requirements(&body),
            Err(DecodeError::InvalidTimestamp { field: "last_completion", .. })
        ));
    }

    #[test]
    fn test_missing_envelope_key() {
        assert!(matches!(
            decode_requirements(&json!({})),
            Err(DecodeError::MissingField { field: "requirements", .. })
        ));
    }
}
