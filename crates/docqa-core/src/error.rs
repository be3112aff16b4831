use thiserror::Error;

/// The four failure classes every core operation reports.
///
/// Hosts map these onto their own responses; the core never folds one kind
/// into another.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    InvalidInput,
    ExternalService,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ExternalService(_) => ErrorKind::ExternalService,
        }
    }

    /// Wrap a storage or transport failure.
    pub fn external<E: std::fmt::Display>(err: E) -> Self {
        Error::ExternalService(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
