use thiserror::Error;

/// Boxed driver error kept as the source of a failed statement
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring, connecting or querying
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query failed: {0}")]
    Query(#[source] DriverError),
    #[error("Driver not available: {0} (not compiled)")]
    DriverNotAvailable(&'static str),
}

impl Error {
    /// Wrap a driver error raised while preparing or executing a statement
    pub fn query<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Query(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
