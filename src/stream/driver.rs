use ahash::AHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

use crate::aggregate::{BoundedCounter, CounterLimits, Hits, IpRank, PathRank, Timing, TopK};
use crate::config::{Cli, EngineConfig};
use crate::error::AnalyzerError;
use crate::metrics::{MetricsSink, LINES_FAILED, LINES_PROCESSED};
use crate::models::{prepare_output, RejectReason, Report, ReportBuilder, RunStatistics};
use crate::parser::{normalize_path, parse_log_line};
use crate::stream::reader::{Line, LineReader};

const PROGRESS_EVERY: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub max_client_ips: usize,
    pub max_paths: usize,
}

impl From<&Cli> for RunOptions {
    fn from(cli: &Cli) -> Self {
        RunOptions {
            input: cli.input.clone(),
            output: cli.output.clone(),
            max_client_ips: usize::from(cli.max_client_ips),
            max_paths: usize::from(cli.max_paths),
        }
    }
}

/// State for one pass over one log. Build a fresh one per run.
pub struct Analyzer {
    stats: RunStatistics,
    client_ips: BoundedCounter<Hits>,
    paths: BoundedCounter<Timing>,
    rejects: AHashMap<RejectReason, u64>,
    max_line_bytes: usize,
}

impl Analyzer {
    pub fn new(config: &EngineConfig) -> Self {
        let limits = CounterLimits {
            slot_budget: config.slot_budget,
            partitions: config.spill_partitions,
            scratch_dir: config.scratch_dir.clone(),
            scratch_limit_bytes: config.scratch_limit_bytes,
        };

        Analyzer {
            stats: RunStatistics::default(),
            client_ips: BoundedCounter::new("client_ips", limits.clone()),
            paths: BoundedCounter::new("paths", limits),
            rejects: AHashMap::new(),
            max_line_bytes: config.max_line_bytes,
        }
    }

    pub fn stats(&self) -> RunStatistics {
        self.stats
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejects.get(&reason).copied().unwrap_or(0)
    }

    /// Accounts one line. Only scratch storage failures are errors; a
    /// malformed line is counted and skipped.
    pub fn feed_line(&mut self, raw: &[u8]) -> Result<(), AnalyzerError> {
        let Ok(line) = std::str::from_utf8(raw) else {
            self.reject(RejectReason::NotUtf8);
            return Ok(());
        };

        let record = match parse_log_line(line) {
            Ok(record) => record,
            Err(reason) => {
                self.reject(reason);
                return Ok(());
            }
        };

        self.stats.record_ok();
        self.client_ips
            .record(&record.client_ip.to_string(), Hits(1))?;
        self.paths.record(
            &normalize_path(record.path),
            Timing::sample(record.response_time_ms),
        )?;
        Ok(())
    }

    fn reject(&mut self, reason: RejectReason) {
        self.stats.record_failed();
        *self.rejects.entry(reason).or_insert(0) += 1;
        tracing::debug!(%reason, line = self.stats.processed(), "rejected log line");
    }

    pub fn consume<R: BufRead>(&mut self, reader: R) -> Result<(), AnalyzerError> {
        let mut lines = LineReader::new(reader, self.max_line_bytes);

        while let Some(line) = lines
            .next_line()
            .map_err(|e| AnalyzerError::io("failed to read input", e))?
        {
            match line {
                Line::Text(raw) => self.feed_line(raw)?,
                Line::TooLong => self.reject(RejectReason::TooLong),
            }

            if self.stats.processed() % PROGRESS_EVERY == 0 {
                tracing::debug!(
                    processed = self.stats.processed(),
                    ok = self.stats.ok(),
                    failed = self.stats.failed(),
                    "progress"
                );
            }
        }
        Ok(())
    }

    /// Merges both counters and selects the top entries.
    pub fn finish(self, max_client_ips: usize, max_paths: usize) -> Result<Report, AnalyzerError> {
        for (reason, count) in &self.rejects {
            tracing::debug!(%reason, count, "rejected lines");
        }

        let mut top_ips = TopK::new(max_client_ips);
        self.client_ips.snapshot(|ip, hits| {
            top_ips.offer(IpRank { ip, count: hits.0 });
        })?;

        let mut top_paths = TopK::new(max_paths);
        self.paths.snapshot(|path, timing| {
            top_paths.offer(PathRank {
                path,
                count: timing.count,
                total_ms: timing.total_ms,
            });
        })?;

        Ok(ReportBuilder::new(self.stats)
            .client_ips(top_ips.into_ranked())
            .paths(top_paths.into_ranked())
            .build())
    }
}

/// Runs the whole pipeline: read `input`, write the report to `output`.
pub fn run(
    options: &RunOptions,
    config: &EngineConfig,
    metrics: &dyn MetricsSink,
) -> Result<Report, AnalyzerError> {
    let started = Instant::now();
    prepare_output(&options.output)?;

    let file = File::open(&options.input).map_err(|e| {
        AnalyzerError::io(format!("failed to open {}", options.input.display()), e)
    })?;
    tracing::info!(input = %options.input.display(), "processing log");

    let mut analyzer = Analyzer::new(config);
    analyzer.consume(BufReader::with_capacity(16384, file))?;
    let stats = analyzer.stats();

    let report = analyzer.finish(options.max_client_ips, options.max_paths)?;
    report.write_to(&options.output)?;

    metrics.count(LINES_PROCESSED, stats.processed());
    metrics.count(LINES_FAILED, stats.failed());

    tracing::info!(
        processed = stats.processed(),
        ok = stats.ok(),
        failed = stats.failed(),
        output = %options.output.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "report written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const SAMPLE: &str = concat!(
        r#"10.10.10.10 - - [27/Feb/2023:12:04:52 +0000] "GET /product/catalog?item=fe23acd HTTP/1.1" 200 1531 "Mozilla/5.0""#, "\n",
        r#"10.10.10.11 - - [27/Feb/2023:12:04:53 +0000] "GET /product/catalog HTTP/1.1" 200 649 "Mozilla/5.0""#, "\n",
        r#"10.10.10.12 - - [27/Feb/2023:12:04:54 +0000] "POST /product/cart HTTP/1.1" 201 1198 "Mozilla/5.0""#, "\n",
        r#"10.10.10.13 - admin [27/Feb/2023:12:04:55 +0000] "GET /admin.php HTTP/1.1" 403 50 "curl/8.0""#, "\n",
    );

    fn analyze(input: &str, config: &EngineConfig, max_ips: usize, max_paths: usize) -> Report {
        let mut analyzer = Analyzer::new(config);
        analyzer.consume(Cursor::new(input.as_bytes())).unwrap();
        analyzer.finish(max_ips, max_paths).unwrap()
    }

    fn ranked_paths(report: &Report) -> Vec<(&str, String)> {
        report
            .top_path_avg_seconds
            .iter()
            .map(|(path, secs)| (path.as_str(), secs.to_string()))
            .collect()
    }

    #[test]
    fn sample_log_report() {
        let report = analyze(SAMPLE, &EngineConfig::default(), 10, 10);

        assert_eq!(report.total_number_of_lines_processed, 4);
        assert_eq!(report.total_number_of_lines_ok, 4);
        assert_eq!(report.total_number_of_lines_failed, 0);
        assert_eq!(
            report.top_client_ips,
            vec![
                ("10.10.10.10".to_string(), 1),
                ("10.10.10.11".to_string(), 1),
                ("10.10.10.12".to_string(), 1),
                ("10.10.10.13".to_string(), 1),
            ]
        );
        assert_eq!(
            ranked_paths(&report),
            vec![
                ("/product/cart", "1.20".to_string()),
                ("/product/catalog", "1.09".to_string()),
                ("/admin.php", "0.05".to_string()),
            ]
        );
    }

    #[test]
    fn invalid_lines_are_counted_not_tallied() {
        let input = concat!(
            r#"10.0.0.1 - - [27/Und/2023:12:04:52 +0000] "GET /a HTTP/1.1" 200 10 "x""#, "\n",
            r#"10.0.0.2 - - [27/Feb/2023:12:04:52 +0000] "GET /b HTTP/1.1" 999 10 "x""#, "\n",
            "\n",
            "   \n",
            r#"10.0.0.3 - - [27/Feb/2023:12:04:52 +0000] "GET /c HTTP/1.1" 200 10 "x""#,
        );
        let mut analyzer = Analyzer::new(&EngineConfig::default());
        analyzer.consume(Cursor::new(input.as_bytes())).unwrap();
        assert_eq!(analyzer.rejected(RejectReason::Timestamp), 1);
        assert_eq!(analyzer.rejected(RejectReason::Status), 1);
        assert_eq!(analyzer.rejected(RejectReason::Empty), 2);

        let report = analyzer.finish(10, 10).unwrap();
        assert_eq!(report.total_number_of_lines_processed, 5);
        assert_eq!(report.total_number_of_lines_ok, 1);
        assert_eq!(report.total_number_of_lines_failed, 4);
        assert_eq!(report.top_client_ips, vec![("10.0.0.3".to_string(), 1)]);
        assert_eq!(ranked_paths(&report), vec![("/c", "0.01".to_string())]);
    }

    #[test]
    fn non_utf8_and_oversized_lines_fail() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(&[b'x'; 200]);
        input.push(b'\n');

        let config = EngineConfig {
            max_line_bytes: 64,
            ..EngineConfig::default()
        };
        let mut analyzer = Analyzer::new(&config);
        analyzer.consume(Cursor::new(input)).unwrap();
        assert_eq!(analyzer.rejected(RejectReason::NotUtf8), 1);
        assert_eq!(analyzer.rejected(RejectReason::TooLong), 1);
        assert_eq!(analyzer.stats().failed(), 2);
    }

    #[test]
    fn decodes_paths_and_canonicalises_ips() {
        let input = concat!(
            r#"2001:0db8:0000:0000:0000:0000:0000:0001 - - [01/Jan/2024:00:00:00 +0000] "GET /caf%C3%A9 HTTP/1.1" 200 100 "x""#, "\n",
            r#"2001:db8::1 - - [01/Jan/2024:00:00:01 +0000] "GET /caf%c3%a9?q=1 HTTP/1.1" 200 300 "x""#, "\n",
        );
        let report = analyze(input, &EngineConfig::default(), 10, 10);
        assert_eq!(report.top_client_ips, vec![("2001:db8::1".to_string(), 2)]);
        assert_eq!(ranked_paths(&report), vec![("/café", "0.20".to_string())]);
    }

    #[test]
    fn zero_limits_keep_totals() {
        let report = analyze(SAMPLE, &EngineConfig::default(), 0, 0);
        assert_eq!(report.total_number_of_lines_processed, 4);
        assert!(report.top_client_ips.is_empty());
        assert!(report.top_path_avg_seconds.is_empty());
    }

    #[test]
    fn empty_input() {
        let report = analyze("", &EngineConfig::default(), 10, 10);
        assert_eq!(report, ReportBuilder::new(RunStatistics::default()).build());
    }

    #[test]
    fn tiny_budget_matches_unbounded_result() {
        let mut input = String::new();
        for i in 0..300u32 {
            let ip = format!("192.168.{}.{}", i % 5, i % 37);
            let path = format!("/item/{}", i % 41);
            input.push_str(&format!(
                "{ip} - - [01/Jan/2024:00:00:00 +0000] \"GET {path}?n={i} HTTP/1.1\" 200 {} \"x\"\n",
                (i * 37) % 1000
            ));
        }

        let unbounded = analyze(&input, &EngineConfig::default(), 10_000, 10_000);
        let tiny = EngineConfig {
            slot_budget: 3,
            spill_partitions: 4,
            ..EngineConfig::default()
        };
        let bounded = analyze(&input, &tiny, 10_000, 10_000);

        assert_eq!(bounded, unbounded);
        let total: u64 = bounded.top_client_ips.iter().map(|(_, c)| c).sum();
        assert_eq!(total, bounded.total_number_of_lines_ok);
    }
}
