pub mod connection;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod value;

pub use connection::{ConnectionOptions, ConnectionOptionsBuilder, DatabaseType};
pub use driver::{create_connection, Connector, DatabaseConnection, DriverConnector};
pub use error::{Error, Result};
pub use registry::{BoundConnection, ConnectionRegistry, Model};
pub use value::{Params, Row, Statement};
