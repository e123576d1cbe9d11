use std::error::Error;
use std::process::ExitCode;

use chunk_lytics::{
    config::{Cli, EngineConfig},
    logging::init_logging,
    metrics::sink_from_config,
    stream::{run, RunOptions},
};
use clap::error::ErrorKind;
use clap::Parser;

const EXIT_CONFIG: u8 = 1;
const EXIT_RUN: u8 = 2;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    init_logging();

    if let Err(e) = cli.check_input() {
        tracing::error!("{}", chain(&e));
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", chain(&e));
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let metrics = sink_from_config(&config);

    match run(&RunOptions::from(&cli), &config, metrics.as_ref()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", chain(&e));
            ExitCode::from(EXIT_RUN)
        }
    }
}

fn chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
