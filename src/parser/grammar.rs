use chrono::{DateTime, Datelike, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;

use crate::models::{ParsedRecord, RejectReason, ValidationOutcome};
use crate::parser::path::split_query;

// $remote_addr - $remote_user [$time_local] "$request" $status $request_time_ms "$http_user_agent"
static LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(?P<ip>\S+) - (?P<user>\S+) \[(?P<date>[^\]]*)\] "#,
        r#""(?P<method>\S+) (?P<target>\S+) (?P<version>HTTP/[0-9]\.[0-9])" "#,
        r#"(?P<status>[0-9]{3}) (?P<time>[0-9]+) "#,
        r#""(?P<agent>(?:[^"\\]|\\.)*)"$"#,
    ))
    .unwrap_or_else(|e| unreachable!("line pattern is a constant: {e}"))
});

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}/[A-Z][a-z]{2}/[0-9]{4}:[0-9]{2}:[0-9]{2}:[0-5][0-9] [+-][0-9]{4}$")
        .unwrap_or_else(|e| unreachable!("date pattern is a constant: {e}"))
});

const CLF_DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Validates one raw log line. Every field must pass or the whole line is
/// rejected.
pub fn parse_log_line(line: &str) -> ValidationOutcome<'_> {
    if line.trim().is_empty() {
        return Err(RejectReason::Empty);
    }

    let tokens = LINE_REGEX.captures(line).ok_or(RejectReason::Shape)?;
    let field = |name: &str| tokens.name(name).map_or("", |m| m.as_str());

    let client_ip = field("ip")
        .parse::<IpAddr>()
        .map_err(|_| RejectReason::ClientIp)?;

    let remote_user = parse_remote_user(field("user"))?;
    let timestamp = parse_clf_date(field("date")).ok_or(RejectReason::Timestamp)?;

    let method = field("method");
    if !is_token(method) {
        return Err(RejectReason::Method);
    }

    let target = field("target");
    if !is_valid_target(target) {
        return Err(RejectReason::Path);
    }
    let (path, query) = split_query(target);

    let status_code = field("status")
        .parse::<u16>()
        .ok()
        .filter(|code| (100..=599).contains(code))
        .ok_or(RejectReason::Status)?;

    // digits only; values past u128 saturate
    let response_time_ms = field("time").parse::<u128>().unwrap_or(u128::MAX);

    Ok(ParsedRecord {
        client_ip,
        remote_user,
        timestamp,
        method,
        path,
        query,
        protocol_version: field("version"),
        status_code,
        response_time_ms,
        user_agent: field("agent"),
    })
}

fn parse_remote_user(user: &str) -> Result<Option<&str>, RejectReason> {
    if user == "-" {
        return Ok(None);
    }
    if user.chars().any(char::is_control) {
        return Err(RejectReason::RemoteUser);
    }
    Ok(Some(user))
}

/// Parses a Common Log Format date (`10/Oct/2000:13:55:36 -0700`).
/// Leap seconds and year zero are not valid clock readings here.
pub fn parse_clf_date(date: &str) -> Option<DateTime<FixedOffset>> {
    if !DATE_REGEX.is_match(date) {
        return None;
    }
    DateTime::parse_from_str(date, CLF_DATE_FORMAT)
        .ok()
        .filter(|timestamp| timestamp.year() >= 1)
}

/// RFC 2616 `token`: one or more CHARs that are neither CTLs nor separators.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"'
                        | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}'
                )
        })
}

/// An absolute path with an optional query. Only visible ASCII is allowed
/// and every `%` must introduce two hex digits.
fn is_valid_target(target: &str) -> bool {
    let bytes = target.as_bytes();
    if bytes.first() != Some(&b'/') {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let well_formed = bytes
                    .get(i + 1..i + 3)
                    .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
                if !well_formed {
                    return false;
                }
                i += 3;
            }
            b'"' => return false,
            b if b.is_ascii_graphic() => i += 1,
            _ => return false,
        }
    }
    true
}
