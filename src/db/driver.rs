use async_trait::async_trait;

use super::connection::{ConnectionOptions, DatabaseType};
use super::error::{Error, Result};
use super::value::{Params, Statement};

/// Core trait for an open database connection.
///
/// Every query helper goes through [`DatabaseConnection::execute`], which
/// prepares the statement server-side, binds `params` and runs it.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Prepare, bind and execute one statement, buffering its result set
    async fn execute(&mut self, sql: &str, params: Params) -> Result<Statement>;

    fn driver(&self) -> DatabaseType;

    /// Release the connection. The default just drops it.
    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Opens connections from shared options
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn DatabaseConnection>>;
}

/// Connector backed by the compiled-in drivers
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn DatabaseConnection>> {
        create_connection(options).await
    }
}

/// Factory function - opens the right connection type based on driver
pub async fn create_connection(options: &ConnectionOptions) -> Result<Box<dyn DatabaseConnection>> {
    let driver = options.driver();
    if !driver.is_available() {
        return Err(Error::DriverNotAvailable(driver.feature_name()));
    }

    match driver {
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => {
            let conn = super::drivers::mysql::MySqlConnection::open(options).await?;
            Ok(Box::new(conn))
        }

        // Fallback for when feature not compiled
        #[allow(unreachable_patterns)]
        _ => Err(Error::DriverNotAvailable(driver.feature_name())),
    }
}
