use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadTestError {
    #[error("invalid target URL: {0}")]
    InvalidTarget(#[from] url::ParseError),
    #[error("unsupported target scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("{0} must be at least 1")]
    ZeroOption(&'static str),
    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to install the prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}
