//! Identifier and format validation for DMS attributes
//!
//! These checks operate on plain strings. `schemas::types` wraps them into
//! `AttributeType::Custom` validators.

use std::sync::LazyLock;

use aws_sdk_databasemigration::primitives::{DateTime, DateTimeFormat};
use regex::Regex;

static IDENTIFIER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z-]+$").expect("invalid identifier regex"));

static SUBNET_GROUP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_ .-]+$").expect("invalid subnet group regex"));

static ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-z-]*:[a-z0-9-]+:[a-z0-9-]*:(\d{12})?:.+$").expect("invalid ARN regex")
});

static MAINTENANCE_WINDOW: LazyLock<Regex> = LazyLock::new(|| {
    let day = "(sun|mon|tue|wed|thu|fri|sat)";
    let time = "([01][0-9]|2[0-3]):[0-5][0-9]";
    Regex::new(&format!("(?i)^{day}:{time}-{day}:{time}$")).expect("invalid window regex")
});

fn check_identifier(value: &str, max_len: usize) -> Result<(), String> {
    if value.is_empty() || value.len() > max_len {
        return Err(format!(
            "must be between 1 and {} characters, got {}",
            max_len,
            value.len()
        ));
    }
    if !IDENTIFIER_CHARS.is_match(value) {
        return Err(format!(
            "only alphanumeric characters and hyphens allowed in '{}'",
            value
        ));
    }
    if !value.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(format!("'{}' must begin with a letter", value));
    }
    if value.contains("--") {
        return Err(format!("'{}' cannot contain two consecutive hyphens", value));
    }
    if value.ends_with('-') {
        return Err(format!("'{}' cannot end in a hyphen", value));
    }
    Ok(())
}

/// Endpoint, certificate and replication task identifiers
pub fn validate_endpoint_id(value: &str) -> Result<(), String> {
    check_identifier(value, 255)
}

pub fn validate_replication_instance_id(value: &str) -> Result<(), String> {
    check_identifier(value, 63)
}

pub fn validate_replication_subnet_group_id(value: &str) -> Result<(), String> {
    if value.is_empty() || value.len() > 255 {
        return Err(format!(
            "must be between 1 and 255 characters, got {}",
            value.len()
        ));
    }
    if !SUBNET_GROUP_CHARS.is_match(value) {
        return Err(format!(
            "only alphanumeric characters, periods, spaces, underscores and hyphens \
             allowed in '{}'",
            value
        ));
    }
    if value.eq_ignore_ascii_case("default") {
        return Err("'default' is a reserved name".to_string());
    }
    Ok(())
}

pub fn validate_arn(value: &str) -> Result<(), String> {
    if ARN.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid ARN", value))
    }
}

/// `ddd:hh24:mi-ddd:hh24:mi`, e.g. `sun:23:45-mon:00:15`
pub fn validate_maintenance_window(value: &str) -> Result<(), String> {
    if MAINTENANCE_WINDOW.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "'{}' must be in the format ddd:hh24:mi-ddd:hh24:mi",
            value
        ))
    }
}

/// Parse a CDC start time given either as RFC3339 or as Unix seconds
pub fn parse_cdc_start_time(value: &str) -> Result<DateTime, String> {
    if let Ok(secs) = value.parse::<i64>() {
        return Ok(DateTime::from_secs(secs));
    }
    DateTime::from_str(value, DateTimeFormat::DateTime)
        .map_err(|_| format!("'{}' must be an RFC3339 timestamp or Unix seconds", value))
}

pub fn validate_cdc_start_time(value: &str) -> Result<(), String> {
    parse_cdc_start_time(value).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_ids() {
        assert!(validate_endpoint_id("source-postgres-1").is_ok());
        assert!(validate_endpoint_id("").is_err());
        assert!(validate_endpoint_id("1-starts-with-digit").is_err());
        assert!(validate_endpoint_id("double--hyphen").is_err());
        assert!(validate_endpoint_id("trailing-").is_err());
        assert!(validate_endpoint_id("under_score").is_err());
        assert!(validate_endpoint_id(&"a".repeat(256)).is_err());
    }

    #[test]
    fn replication_instance_ids_are_shorter() {
        assert!(validate_replication_instance_id(&"a".repeat(63)).is_ok());
        assert!(validate_replication_instance_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn subnet_group_ids() {
        assert!(validate_replication_subnet_group_id("my subnet_group.1-a").is_ok());
        assert!(validate_replication_subnet_group_id("default").is_err());
        assert!(validate_replication_subnet_group_id("bad/char").is_err());
    }

    #[test]
    fn arns() {
        assert!(validate_arn("arn:aws:iam::123456789012:role/dms-access").is_ok());
        assert!(validate_arn("arn:aws:kms:us-west-2:123456789012:key/abcd").is_ok());
        assert!(validate_arn("arn:aws-us-gov:dms:us-gov-west-1:123456789012:endpoint:X").is_ok());
        assert!(validate_arn("not-an-arn").is_err());
        assert!(validate_arn("arn:aws:iam::12345:role/x").is_err());
    }

    #[test]
    fn maintenance_windows() {
        assert!(validate_maintenance_window("sun:23:45-mon:00:15").is_ok());
        assert!(validate_maintenance_window("Tue:04:00-Tue:04:30").is_ok());
        assert!(validate_maintenance_window("sun:24:00-mon:00:15").is_err());
        assert!(validate_maintenance_window("sunday:10:00-sunday:11:00").is_err());
    }

    #[test]
    fn cdc_start_times() {
        assert_eq!(
            parse_cdc_start_time("1700000000").map(|t| t.secs()),
            Ok(1_700_000_000)
        );
        assert_eq!(
            parse_cdc_start_time("2023-11-14T22:13:20Z").map(|t| t.secs()),
            Ok(1_700_000_000)
        );
        assert!(validate_cdc_start_time("yesterday").is_err());
    }
}
