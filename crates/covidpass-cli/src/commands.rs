//! Subcommand handlers. Each one fetches through the core API and prints
//! a markdown-style table or a short report.

use anyhow::Result;
use chrono::Local;
use dialoguer::{Confirm, Input};
use reqwest::Response;

use covidpass_core::api::{
    fetch_locations, fetch_requirements, fetch_test_results, submit_attestation, submit_medical,
};
use covidpass_core::AuthSession;

use crate::format::{format_date, format_datetime, latest_result_notice, requirement_notice};

pub const MAP_URL: &str =
    "https://covidapps.mit.edu/sites/default/files/documents/MITCampusAccessMap.pdf";

/// Expected number of digits after `D-` on an at-home test label.
const BARCODE_DIGITS: usize = 10;

const SWAB_STEPS: &[&str] = &[
    "Wash hands for 20 seconds",
    "Unscrew and discard the cap",
    "Take the swab",
    "Rotate 3 times in first nostril",
    "Slide up and down 3 times",
    "Hold for 10 seconds",
    "Repeat 4-6 in the other nostril",
    "Put the swab in the collection device",
    "Put the collection device into the biohazard bag",
];

pub async fn status(session: &mut AuthSession) -> Result<()> {
    let requirements = fetch_requirements(session).await?;

    println!(
        "| {:^11} | {:^20} | {:^13} | {:^16} | {:^16} |",
        "id", "title", "status", "last completion", "next completion"
    );
    println!(
        "|-{}-|-{}-|:{}:|:{}:|:{}:|",
        "-".repeat(11),
        "-".repeat(20),
        "-".repeat(13),
        "-".repeat(16),
        "-".repeat(16)
    );
    for r in requirements.values() {
        println!(
            "| {:11} | {:20} | {:^13} | {:^16} | {:^16} |",
            r.id,
            r.title_web,
            r.status.as_str(),
            format_datetime(r.last_completion),
            format_datetime(r.next_completion)
        );
    }
    println!();

    let now = Local::now();
    for notice in requirements.values().filter_map(|r| requirement_notice(r, now)) {
        println!("{notice}");
    }

    println!();
    let results = fetch_test_results(session).await?;
    if let Some(latest) = results.first() {
        for line in latest_result_notice(latest) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn locations(session: &mut AuthSession, days: u32) -> Result<()> {
    let locations = fetch_locations(session, days, true).await?;

    println!(
        "| {:^6} | {:^3} | {:^20} | {:^8} | {:^8} | {:^9} |",
        "day", "id", "title", "open", "close", "self-test"
    );
    println!(
        "|-{}-|-{}:|:{}:|:{}:|:{}:|:{}:|",
        "-".repeat(6),
        "-".repeat(3),
        "-".repeat(20),
        "-".repeat(8),
        "-".repeat(8),
        "-".repeat(9)
    );
    for l in locations.iter().filter(|l| l.is_open) {
        println!(
            "| {:6} | {:>3} | {:^20} | {:^8} | {:^8} | {:^9} |",
            l.day_title,
            l.location_id,
            l.name,
            l.open_time,
            l.close_time,
            l.self_test().label()
        );
    }
    Ok(())
}

pub async fn results(session: &mut AuthSession, count: usize) -> Result<()> {
    let results = fetch_test_results(session).await?;

    println!("| {:^10} | {:^1} | {:^10} |", "date", "", "company");
    println!("|:{}:|:{}:|:{}:|", "-".repeat(10), "-", "-".repeat(10));
    for r in results.iter().take(count) {
        println!(
            "| {:^10} | {:^1} | {:^10} | {}",
            format_date(r.test_date),
            r.result.as_ref().map(|c| c.as_str()).unwrap_or("?"),
            r.test_company.as_deref().unwrap_or(""),
            r.test_guid
        );
    }
    if results.len() > count {
        println!("(and {} more)", results.len() - count);
    }
    Ok(())
}

pub async fn attest(session: &mut AuthSession) -> Result<()> {
    let response = submit_attestation(session, false, false, true).await?;
    if response.status().is_success() {
        println!("Daily attestation submitted successfully!");
    } else {
        println!("Failed to submit attestation.");
        print_failure(response).await;
    }
    Ok(())
}

pub async fn medical(session: &mut AuthSession) -> Result<()> {
    let code = prompt("Enter the 10-digit code after D-")?;
    if code.len() != BARCODE_DIGITS {
        let proceed = Confirm::new()
            .with_prompt("Your code is not 10 digits long. Continue anyways?")
            .default(false)
            .interact()?;
        if !proceed {
            return Ok(());
        }
    }
    for (i, step) in SWAB_STEPS.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }

    let again = prompt("Re-enter the code after D-")?;
    if code != again {
        println!("Codes don't match!");
        return Ok(());
    }

    let response = submit_medical(session, &code).await?;
    if response.status().is_success() {
        println!(
            "Medical submitted. Bring the biohazard bag to one of the test collection points \
             (see `covidpass locations`)."
        );
    } else {
        println!("Failed to submit medical test.");
        print_failure(response).await;
    }
    Ok(())
}

async fn print_failure(response: Response) {
    let status = response.status();
    println!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );
    println!("{}", response.text().await.unwrap_or_default());
}

fn prompt(message: &str) -> Result<String> {
    let input: String = Input::new().with_prompt(message).interact_text()?;
    Ok(input.trim().to_string())
}
