use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("external api error: {0}")]
    ExternalApi(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;
