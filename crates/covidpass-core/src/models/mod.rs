//! Data models for CovidPass API records.
//!
//! Each record type has an explicit `from_json` decoder:
//!
//! - `Requirement`: campus-access requirements and their completion windows
//! - `Location`: testing sites per day, with self-test kit availability
//! - `TestResult`: lab results, most recent first

pub mod decode;
pub mod location;
pub mod requirement;
pub mod test_result;

pub use decode::{parse_iso8601, parse_iso8601_in, DecodeError};
pub use location::{decode_locations, Location, SelfTestAvailability};
pub use requirement::{decode_requirements, Requirement, RequirementStatus};
pub use test_result::{decode_test_results, ResultCode, TestResult};
