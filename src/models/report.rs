use serde::ser::{Error as _, Serializer};
use serde::Serialize;
use serde_json::value::RawValue;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::aggregate::{IpRank, PathRank};
use crate::error::AnalyzerError;
use crate::models::RunStatistics;

/// A mean response time rounded half-up to the nearest hundredth of a
/// second. Stored as whole hundredths so the rounding is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Seconds {
    hundredths: u64,
}

impl Seconds {
    pub fn from_mean_ms(total_ms: u128, count: u64) -> Self {
        debug_assert!(count > 0);
        let count = u128::from(count.max(1));
        let hundredths = total_ms.saturating_add(5 * count) / (10 * count);
        Seconds {
            hundredths: u64::try_from(hundredths).unwrap_or(u64::MAX),
        }
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.hundredths / 100, self.hundredths % 100)
    }
}

// Emitted as a bare JSON number that keeps both decimals (`1.20`).
impl Serialize for Seconds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.to_string()).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

fn serialize_ranked<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(entries.iter().map(|(key, value)| (key, value)))
}

/// The only thing written to the output file. Object members keep rank
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_number_of_lines_processed: u64,
    pub total_number_of_lines_ok: u64,
    pub total_number_of_lines_failed: u64,
    #[serde(serialize_with = "serialize_ranked")]
    pub top_client_ips: Vec<(String, u64)>,
    #[serde(serialize_with = "serialize_ranked")]
    pub top_path_avg_seconds: Vec<(String, Seconds)>,
}

impl Report {
    pub fn to_json(&self) -> Result<String, AnalyzerError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes the report next to its destination and renames it into
    /// place, so a failed run never leaves a half-written report behind.
    pub fn write_to(&self, path: &Path) -> Result<(), AnalyzerError> {
        let json = self.to_json()?;
        let mut staged = stage_output(path)?;
        staged
            .write_all(json.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| AnalyzerError::io(format!("failed to write {}", path.display()), e))?;
        staged.persist(path).map_err(|e| {
            AnalyzerError::io(format!("failed to replace {}", path.display()), e.error)
        })?;

        Ok(())
    }
}

fn output_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn stage_output(path: &Path) -> Result<tempfile::NamedTempFile, AnalyzerError> {
    let dir = output_dir(path);
    fs::create_dir_all(dir).map_err(|e| {
        AnalyzerError::io(format!("[--out] failed to access {}", dir.display()), e)
    })?;
    tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        AnalyzerError::io(format!("[--out] failed to access {}", path.display()), e)
    })
}

/// Fails early when the report could not be written later. Creates
/// missing parent directories but leaves no file behind.
pub fn prepare_output(path: &Path) -> Result<(), AnalyzerError> {
    if path.is_dir() {
        return Err(AnalyzerError::io(
            format!("[--out] failed to access {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::Other, "output path is a directory"),
        ));
    }
    stage_output(path).map(drop)
}

#[derive(Debug, Default)]
pub struct ReportBuilder {
    stats: RunStatistics,
    client_ips: Vec<(String, u64)>,
    paths: Vec<(String, Seconds)>,
}

impl ReportBuilder {
    pub fn new(stats: RunStatistics) -> Self {
        ReportBuilder {
            stats,
            ..ReportBuilder::default()
        }
    }

    pub fn client_ips(mut self, ranked: Vec<IpRank>) -> Self {
        self.client_ips = ranked.into_iter().map(|r| (r.ip, r.count)).collect();
        self
    }

    pub fn paths(mut self, ranked: Vec<PathRank>) -> Self {
        self.paths = ranked
            .into_iter()
            .map(|r| {
                let mean = r.mean_seconds();
                (r.path, mean)
            })
            .collect();
        self
    }

    pub fn build(self) -> Report {
        Report {
            total_number_of_lines_processed: self.stats.processed(),
            total_number_of_lines_ok: self.stats.ok(),
            total_number_of_lines_failed: self.stats.failed(),
            top_client_ips: self.client_ips,
            top_path_avg_seconds: self.paths,
        }
    }
}
