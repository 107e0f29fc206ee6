use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid request window: {0}")]
    InvalidWindow(String),

    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown symbol on remote: {0}")]
    UnknownSymbol(String),

    #[error("Fetch failed for {key} over {interval}: {reason}")]
    FetchExhausted {
        key: String,
        interval: String,
        reason: String,
    },

    #[error("Remote protocol violation for {key}: {detail}")]
    ProtocolViolation { key: String, detail: String },

    #[error("Gap in merged series for {key}: {detail}")]
    SeriesGap { key: String, detail: String },

    #[error("Cache I/O error at {path}: {detail}")]
    CacheIo { path: String, detail: String },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Io(format!("CSV error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
