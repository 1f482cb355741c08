//! Lazily opened, one-per-model database connections.
//!
//! Build one [`ConnectionOptions`], hand it to a [`ConnectionRegistry`], and
//! ask the registry for model instances. Each [`Model`] type gets exactly one
//! connection, opened on first request and released by
//! [`ConnectionRegistry::flush`].

pub mod db;

pub use db::{
    BoundConnection, ConnectionOptions, ConnectionOptionsBuilder, ConnectionRegistry, Connector,
    DatabaseConnection, DatabaseType, DriverConnector, Error, Model, Params, Result, Row,
    Statement,
};
