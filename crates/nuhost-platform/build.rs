//! Build script: stamp version metadata surfaced by the host info endpoints.

use std::env;
use std::process::Command;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const UNKNOWN: &str = "unknown";
const FALLBACK_DATE: &str = "1970-01-01T00:00:00Z";

fn build_date() -> String {
    let timestamp = match env::var("SOURCE_DATE_EPOCH") {
        Ok(raw) => match raw.parse::<i64>() {
            Ok(ts) => OffsetDateTime::from_unix_timestamp(ts).ok(),
            Err(_) => {
                println!(
                    "cargo:warning=Invalid SOURCE_DATE_EPOCH '{raw}'; expected integer seconds \
                     since Unix epoch; falling back to {FALLBACK_DATE}"
                );
                None
            }
        },
        Err(_) => Some(OffsetDateTime::now_utc()),
    };

    timestamp
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| FALLBACK_DATE.into())
}

fn git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN.into())
}

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-env=NUHOST_BUILD_DATE={}", build_date());
    println!(
        "cargo:rustc-env=NUHOST_BUILD_BRANCH={}",
        git(&["rev-parse", "--abbrev-ref", "HEAD"])
    );
    println!(
        "cargo:rustc-env=NUHOST_BUILD_COMMIT={}",
        git(&["rev-parse", "HEAD"])
    );
}
