use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::net::IpAddr;

/// One validated access log line. Lives only long enough to be counted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord<'a> {
    pub client_ip: IpAddr,
    pub remote_user: Option<&'a str>,
    pub timestamp: DateTime<FixedOffset>,
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub protocol_version: &'a str,
    pub status_code: u16,
    pub response_time_ms: u128,
    pub user_agent: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Empty,
    TooLong,
    NotUtf8,
    Shape,
    ClientIp,
    RemoteUser,
    Timestamp,
    Method,
    Path,
    Status,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::TooLong => "too_long",
            RejectReason::NotUtf8 => "not_utf8",
            RejectReason::Shape => "shape",
            RejectReason::ClientIp => "client_ip",
            RejectReason::RemoteUser => "remote_user",
            RejectReason::Timestamp => "timestamp",
            RejectReason::Method => "method",
            RejectReason::Path => "path",
            RejectReason::Status => "status",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ValidationOutcome<'a> = Result<ParsedRecord<'a>, RejectReason>;

/// Line accounting for one run. `processed == ok + failed` holds after
/// every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    processed: u64,
    ok: u64,
    failed: u64,
}

impl RunStatistics {
    pub fn record_ok(&mut self) {
        self.processed += 1;
        self.ok += 1;
    }

    pub fn record_failed(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn ok(&self) -> u64 {
        self.ok
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}
