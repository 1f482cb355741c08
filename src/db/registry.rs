//! Per-model connection registry.
//!
//! A [`ConnectionRegistry`] hands out one instance of each [`Model`] type,
//! each holding its own connection opened lazily from the shared
//! [`ConnectionOptions`]. Registries are plain values: create one per
//! application (or per test) and pass it where it is needed.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::connection::ConnectionOptions;
use super::driver::{Connector, DatabaseConnection, DriverConnector};
use super::error::{Error, Result};
use super::value::{is_truthy, Params, Row, Statement};

type Slot = Arc<Mutex<Option<Box<dyn DatabaseConnection>>>>;

/// A type that owns one registry-managed connection.
///
/// Implementors keep the [`BoundConnection`] they are built with in a
/// private field and expose their own query methods; the trait has no
/// accessor, so nothing outside the model reaches the connection.
/// `BoundConnection` is not `Clone`, so a model cannot be duplicated into a
/// second handle on the same connection.
///
/// ```ignore
/// pub struct ProductModel {
///     conn: BoundConnection,
/// }
///
/// impl Model for ProductModel {
///     fn bind(conn: BoundConnection) -> Self {
///         Self { conn }
///     }
/// }
///
/// impl ProductModel {
///     pub async fn priced_above(&self, min: i64) -> Result<Vec<Row>> {
///         self.conn
///             .query_multiple_rows("SELECT id, name FROM products WHERE price > ?", vec![min.into()])
///             .await
///     }
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    fn bind(connection: BoundConnection) -> Self;
}

/// The connection handle bound to one model instance
pub struct BoundConnection {
    model: &'static str,
    slot: Slot,
}

impl BoundConnection {
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// False once the registry has been flushed
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Shared prepare + execute path for every helper below
    async fn execute(&self, sql: &str, params: Params) -> Result<Statement> {
        let mut guard = self.slot.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.released())?;
        debug!(model = self.model, params = params.len(), "executing statement");
        conn.execute(sql, params).await
    }

    fn released(&self) -> Error {
        Error::Connection(format!(
            "connection for {} was released by flush",
            self.model
        ))
    }

    /// First row of the result, or `None` when nothing matched
    pub async fn query_single_row(&self, sql: &str, params: impl Into<Params>) -> Result<Option<Row>> {
        Ok(self.execute(sql, params.into()).await?.fetch())
    }

    /// Every row of the result, in order
    pub async fn query_multiple_rows(&self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        Ok(self.execute(sql, params.into()).await?.fetch_all())
    }

    /// Whether the first column of the first row is truthy.
    ///
    /// Meant for `SELECT COUNT(*) ...` or `SELECT EXISTS(...)` queries.
    pub async fn row_exists(&self, sql: &str, params: impl Into<Params>) -> Result<bool> {
        let mut stmt = self.execute(sql, params.into()).await?;
        Ok(stmt.fetch_column().is_some_and(|value| is_truthy(&value)))
    }

    /// Executed statement for direct use (writes, affected rows, insert ids)
    pub async fn raw_query(&self, sql: &str, params: impl Into<Params>) -> Result<Statement> {
        self.execute(sql, params.into()).await
    }

    /// The underlying driver connection. Holds the connection lock until
    /// the guard is dropped.
    pub async fn connection_handle(&self) -> Result<MappedMutexGuard<'_, Box<dyn DatabaseConnection>>> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| self.released())
    }
}

impl std::fmt::Debug for BoundConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundConnection")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

struct Entry {
    model: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    slot: Slot,
}

#[derive(Default)]
struct RegistryState {
    options: Option<Arc<ConnectionOptions>>,
    entries: HashMap<TypeId, Entry>,
}

/// Maps each model type to exactly one live connection
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Registry that opens connections through the compiled-in drivers
    pub fn new() -> Self {
        Self::with_connector(Arc::new(DriverConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Store the options every later connection is opened with.
    ///
    /// The last call wins. Connections that are already open keep the
    /// options they were opened with.
    pub async fn set_options(&self, options: ConnectionOptions) {
        let mut state = self.state.lock().await;
        if state.options.is_some() && !state.entries.is_empty() {
            warn!(
                open_connections = state.entries.len(),
                "replacing connection options while connections are open"
            );
        }
        debug!(dsn = %options.connection_string(), "connection options set");
        state.options = Some(Arc::new(options));
    }

    pub async fn options(&self) -> Option<Arc<ConnectionOptions>> {
        self.state.lock().await.options.clone()
    }

    /// The instance of `M`, opening its connection on first use.
    ///
    /// Repeated calls return the same `Arc`. Fails with
    /// [`Error::Configuration`] if no options were set, or
    /// [`Error::Connection`] if the driver cannot connect.
    pub async fn get_instance<M: Model>(&self) -> Result<Arc<M>> {
        let key = TypeId::of::<M>();
        let model = type_name::<M>();

        // Held across the connect so two first calls cannot both open
        let mut state = self.state.lock().await;

        if let Some(entry) = state.entries.get(&key) {
            debug!(model, "returning registered instance");
            return Arc::clone(&entry.instance)
                .downcast::<M>()
                .map_err(|_| Error::Configuration(format!("registry entry for {} has the wrong type", model)));
        }

        let options = state.options.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "no connection options set before opening a connection for {}",
                model
            ))
        })?;

        let conn = self.connector.connect(&options).await.map_err(|e| match e {
            Error::Query(source) => Error::Connection(source.to_string()),
            other => other,
        })?;
        info!(model, dsn = %options.connection_string(), "opened connection");

        let slot: Slot = Arc::new(Mutex::new(Some(conn)));
        let instance = Arc::new(M::bind(BoundConnection {
            model,
            slot: Arc::clone(&slot),
        }));

        state.entries.insert(
            key,
            Entry {
                model,
                instance: Arc::clone(&instance) as Arc<dyn Any + Send + Sync>,
                slot,
            },
        );

        Ok(instance)
    }

    /// Release every connection and forget every instance.
    ///
    /// Instances handed out earlier stay alive but fail with
    /// [`Error::Connection`] on their next query; calling
    /// [`get_instance`](Self::get_instance) again opens a fresh connection.
    /// Returns the number of connections released.
    pub async fn flush(&self) -> usize {
        let entries: Vec<Entry> = {
            let mut state = self.state.lock().await;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        let mut released = 0;
        for entry in entries {
            let conn = entry.slot.lock().await.take();
            if let Some(conn) = conn {
                released += 1;
                if let Err(e) = conn.close().await {
                    warn!(model = entry.model, error = %e, "error while closing connection");
                }
            }
        }

        info!(released, "flushed connections");
        released
    }

    pub async fn is_registered<M: Model>(&self) -> bool {
        self.state
            .lock()
            .await
            .entries
            .contains_key(&TypeId::of::<M>())
    }

    /// Number of registered model instances
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.try_lock();
        f.debug_struct("ConnectionRegistry")
            .field(
                "models",
                &state
                    .as_ref()
                    .map(|s| s.entries.values().map(|e| e.model).collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .field(
                "configured",
                &state.as_ref().map(|s| s.options.is_some()).unwrap_or(false),
            )
            .finish()
    }
}
