use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("[--in] must contain a valid filepath: {0}")]
    MissingInput(PathBuf),

    #[error("invalid statsd server address {0:?}, expected host:port")]
    StatsdAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("corrupt scratch record in {path}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("resource budget exhausted: {0}")]
    ResourceExhausted(String),

    #[error("failed to serialize report")]
    Serialize(#[from] serde_json::Error),
}

impl AnalyzerError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        AnalyzerError::Io {
            context: context.into(),
            source,
        }
    }
}
