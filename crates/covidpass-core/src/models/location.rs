use serde_json::Value;

use super::decode::{decode_list, DecodeError, Fields};

/// Whether a site hands out and/or collects at-home test kits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestAvailability {
    No,
    PickUp,
    DropOff,
    Yes,
}

impl SelfTestAvailability {
    pub fn from_flags(pick_up: bool, drop_off: bool) -> Self {
        match (pick_up, drop_off) {
            (false, false) => Self::No,
            (true, false) => Self::PickUp,
            (false, true) => Self::DropOff,
            (true, true) => Self::Yes,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::PickUp => "pick-up",
            Self::DropOff => "drop-off",
            Self::Yes => "yes",
        }
    }
}

impl std::fmt::Display for SelfTestAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A testing site on one calendar day. The same site shows up once per
/// day in the `queue_times` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub location_id: i64,
    pub name: String,
    pub day_title: String,
    pub open_time: String,
    pub close_time: String,
    pub is_open: bool,
    pub is_open_24_hours: bool,
    pub medical_queue_indicator: bool,
    pub unobserved_pick_up: bool,
    pub unobserved_drop_off: bool,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub wait_time: Option<String>,
    pub wait_time_text: Option<String>,
}

impl Location {
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let fields = Fields::new("Location", value)?;
        Ok(Self {
            location_id: fields.required_i64("location_id")?,
            name: fields.required_str("name")?,
            day_title: fields.required_str("day_title")?,
            open_time: fields.required_str("open_time")?,
            close_time: fields.required_str("close_time")?,
            is_open: fields.required_bool("is_open")?,
            is_open_24_hours: fields.required_bool("is_open_24_hours")?,
            medical_queue_indicator: fields.required_bool("medical_queue_indicator")?,
            unobserved_pick_up: fields.required_bool("unobserved_pick_up")?,
            unobserved_drop_off: fields.required_bool("unobserved_drop_off")?,
            latitude: fields.optional_str("latitude")?,
            longitude: fields.optional_str("longitude")?,
            wait_time: fields.optional_str("wait_time")?,
            wait_time_text: fields.optional_str("wait_time_text")?,
        })
    }

    pub fn self_test(&self) -> SelfTestAvailability {
        SelfTestAvailability::from_flags(self.unobserved_pick_up, self.unobserved_drop_off)
    }
}

pub fn decode_locations(body: &Value) -> Result<Vec<Location>, DecodeError> {
    decode_list("QueueTimes", body, Location::from_json)
}
