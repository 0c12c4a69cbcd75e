//! Table cells and status notices for terminal output.

use chrono::{DateTime, Duration, Local};

use covidpass_core::models::{Requirement, RequirementStatus, ResultCode, TestResult};

/// Hours before expiry at which a requirement starts warning.
pub fn warning_hours(requirement_id: &str) -> Option<i64> {
    match requirement_id {
        "medical" => Some(24),
        "attestation" => Some(6),
        _ => None,
    }
}

pub fn format_datetime(dt: Option<DateTime<Local>>) -> String {
    dt.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

pub fn format_date(dt: Option<DateTime<Local>>) -> String {
    dt.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Render a duration as `1 day, 2:03:04`, days omitted when zero.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

/// Expiry or incompleteness notice for one requirement, if any.
pub fn requirement_notice(requirement: &Requirement, now: DateTime<Local>) -> Option<String> {
    match requirement.next_completion {
        Some(next) if requirement.is_expired_at(now) => Some(format!(
            "{} has expired on {}!",
            requirement.title_web,
            next.format("%Y-%m-%d %H:%M")
        )),
        Some(next) => {
            let hours = warning_hours(&requirement.id)?;
            let remaining = next - now;
            (remaining < Duration::hours(hours)).then(|| {
                format!(
                    "{} expires on {} (in {})!",
                    requirement.title_web,
                    next.format("%Y-%m-%d %H:%M"),
                    format_remaining(remaining)
                )
            })
        }
        None if requirement.status == RequirementStatus::Incomplete => {
            Some(format!("{} is incomplete!", requirement.title_web))
        }
        None => None,
    }
}

/// Lines describing the most recent test, empty for a negative result.
pub fn latest_result_notice(latest: &TestResult) -> Vec<String> {
    let date = format_date(latest.test_date);
    match &latest.result {
        None => vec![format!("Your latest COVID test ({date}) is still pending.")],
        Some(ResultCode::Negative) => Vec::new(),
        Some(ResultCode::Positive) => vec![
            format!("Your latest COVID test ({date}) was positive."),
            "Please use the official web app (https://covidpass.mit.edu/) instead of this CLI \
             until you are out of isolation."
                .to_string(),
        ],
        Some(ResultCode::Invalid) => vec![
            format!("Your latest COVID test ({date}) was invalid."),
            "This might mean you didn't take the sample correctly. You should probably redo the test."
                .to_string(),
        ],
        Some(ResultCode::Unknown(code)) => vec![
            format!("Your latest COVID test ({date}) result was `{code}`."),
            "Please submit an issue or a pull request if you figure out what this means."
                .to_string(),
        ],
    }
}
