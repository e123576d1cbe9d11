use clap::Parser;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const MAX_TOP_ENTRIES: u16 = 10_000;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chunk-lytics",
    version,
    about = "nginx access log parser and extractor"
)]
pub struct Cli {
    /// Input file to be parsed
    #[arg(long = "in", value_name = "FILE")]
    pub input: PathBuf,

    /// Output JSON file
    #[arg(long = "out", value_name = "FILE")]
    pub output: PathBuf,

    /// Maximum number of entries in top_client_ips
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u16).range(0..=MAX_TOP_ENTRIES as i64)
    )]
    pub max_client_ips: u16,

    /// Maximum number of entries in top_path_avg_seconds
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u16).range(0..=MAX_TOP_ENTRIES as i64)
    )]
    pub max_paths: u16,

    /// Engine tuning file (toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn check_input(&self) -> Result<(), ConfigError> {
        if self.input.is_file() {
            Ok(())
        } else {
            Err(ConfigError::MissingInput(self.input.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["chunk-lytics", "--in", "a.log", "--out", "b.json"]).unwrap();
        assert_eq!(cli.max_client_ips, 10);
        assert_eq!(cli.max_paths, 10);
        assert!(cli.config.is_none());
    }

    #[test]
    fn range_is_enforced() {
        let ok = Cli::try_parse_from([
            "chunk-lytics", "--in", "a", "--out", "b", "--max-client-ips", "0", "--max-paths", "10000",
        ]);
        assert!(ok.is_ok());

        for bad in ["10001", "-1", "ten"] {
            let parsed = Cli::try_parse_from([
                "chunk-lytics", "--in", "a", "--out", "b", "--max-paths", bad,
            ]);
            assert!(parsed.is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn input_and_output_are_required() {
        assert!(Cli::try_parse_from(["chunk-lytics", "--in", "a"]).is_err());
        assert!(Cli::try_parse_from(["chunk-lytics", "--out", "b"]).is_err());
    }
}
