/// Core error type for framecast
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid stream name: {0}. Use alphanumeric, underscore, or dash only")]
    InvalidName(String),

    #[error("Maximum concurrent streams ({0}) reached")]
    CapacityExceeded(usize),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
