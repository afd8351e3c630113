//! Built-in `format` checks for strings and numbers.
//!
//! Unknown formats are accepted.

use regex::Regex;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("hostname pattern is valid")
});

static BYTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
        .expect("base64 pattern is valid")
});

/// Check a string against `format`; `Err` carries the reason.
pub fn check_string(format: &str, value: &str) -> Result<(), String> {
    let valid = match format {
        "date" => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        "date-time" => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        "uuid" => value.len() == 36 && uuid::Uuid::try_parse(value).is_ok(),
        "email" => EMAIL.is_match(value),
        "hostname" => value.len() <= 253 && HOSTNAME.is_match(value),
        "ipv4" => value.parse::<Ipv4Addr>().is_ok(),
        "ipv6" => value.parse::<Ipv6Addr>().is_ok(),
        "uri" => url::Url::parse(value).is_ok(),
        "byte" => BYTE.is_match(value),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("string doesn't match the format \"{}\"", format))
    }
}

/// Check a number against an integer width `format`.
pub fn check_number(format: &str, value: f64) -> Result<(), String> {
    let (min, max) = match format {
        "int32" => (i32::MIN as f64, i32::MAX as f64),
        "int64" => (i64::MIN as f64, i64::MAX as f64),
        _ => return Ok(()),
    };
    if value < min || value > max {
        Err(format!("number must be a valid {}", format))
    } else {
        Ok(())
    }
}
