//! Field-level decoding helpers shared by the record types.
//!
//! Each record is decoded from a `serde_json::Value` by an explicit
//! `from_json` function. These helpers keep the absent / null / present
//! rules in one place:
//!
//! - required fields must be present, non-null and of the declared type;
//! - optional fields map absent and `null` to `None`;
//! - optional timestamps additionally map the empty string to `None` and
//!   must otherwise parse as ISO-8601.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{record}: expected a JSON object")]
    NotAnObject { record: &'static str },

    #[error("{record}: expected a JSON array")]
    NotAList { record: &'static str },

    #[error("{record}: missing required field `{field}`")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record}: field `{field}` should be {expected}")]
    WrongType {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{record}: field `{field}` is not an ISO-8601 timestamp: {value:?}")]
    InvalidTimestamp {
        record: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("requirement status not recognized: {0:?}")]
    InvalidStatus(String),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Offset-carrying layouts tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Layouts without an offset; interpreted in the local timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp and normalize it to the local timezone.
///
/// Timestamps with an offset keep their instant. Timestamps without one
/// are taken as local wall-clock time, and a bare date means local
/// midnight. Returns `None` when nothing matches.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Local>> {
    parse_iso8601_in(value, &Local)
}

/// [`parse_iso8601`] against an arbitrary zone standing in for local time.
pub fn parse_iso8601_in<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(tz));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(tz));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return from_naive(tz, naive);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| from_naive(tz, naive))
}

// DST gaps have no local instant; folds resolve to the earlier one.
fn from_naive<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

/// Borrowed view over one JSON object being decoded into `record`.
pub(crate) struct Fields<'a> {
    record: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(record: &'static str, value: &'a Value) -> Result<Self, DecodeError> {
        value
            .as_object()
            .map(|map| Self { record, map })
            .ok_or(DecodeError::NotAnObject { record })
    }

    /// The field's value, treating JSON `null` the same as absence.
    fn present(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        match self.map.get(field) {
            None => Err(DecodeError::MissingField {
                record: self.record,
                field,
            }),
            Some(v) => Ok(v),
        }
    }

    fn wrong_type(&self, field: &'static str, expected: &'static str) -> DecodeError {
        DecodeError::WrongType {
            record: self.record,
            field,
            expected,
        }
    }

    pub fn required_str(&self, field: &'static str) -> Result<String, DecodeError> {
        self.required(field)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type(field, "a string"))
    }

    pub fn required_bool(&self, field: &'static str) -> Result<bool, DecodeError> {
        self.required(field)?
            .as_bool()
            .ok_or_else(|| self.wrong_type(field, "a boolean"))
    }

    pub fn required_i64(&self, field: &'static str) -> Result<i64, DecodeError> {
        self.required(field)?
            .as_i64()
            .ok_or_else(|| self.wrong_type(field, "an integer"))
    }

    pub fn optional_str(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        self.present(field)
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.wrong_type(field, "a string or null"))
            })
            .transpose()
    }

    pub fn optional_bool(&self, field: &'static str) -> Result<Option<bool>, DecodeError> {
        self.present(field)
            .map(|v| v.as_bool().ok_or_else(|| self.wrong_type(field, "a boolean or null")))
            .transpose()
    }

    pub fn optional_str_list(
        &self,
        field: &'static str,
    ) -> Result<Option<Vec<String>>, DecodeError> {
        let Some(value) = self.present(field) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.wrong_type(field, "a list of strings or null"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.wrong_type(field, "a list of strings or null"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn optional_datetime(
        &self,
        field: &'static str,
    ) -> Result<Option<DateTime<Local>>, DecodeError> {
        let Some(value) = self.present(field) else {
            return Ok(None);
        };
        let text = value
            .as_str()
            .ok_or_else(|| self.wrong_type(field, "an ISO-8601 string or null"))?;
        if text.is_empty() {
            return Ok(None);
        }
        parse_iso8601(text)
            .map(Some)
            .ok_or_else(|| DecodeError::InvalidTimestamp {
                record: self.record,
                field,
                value: text.to_string(),
            })
    }
}

/// Decode a JSON array of records with `decode`, failing on the first bad one.
pub(crate) fn decode_list<T>(
    record: &'static str,
    value: &Value,
    decode: impl Fn(&Value) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    value
        .as_array()
        .ok_or(DecodeError::NotAList { record })?
        .iter()
        .map(decode)
        .collect()
}
