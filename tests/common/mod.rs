//! Shared test infrastructure for registry tests
//!
//! `SqliteConnector` opens an in-memory SQLite database seeded with a small
//! `products` table, so the registry runs real SQL without a MySQL server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use model_registry::{
    BoundConnection, ConnectionOptions, Connector, DatabaseConnection, DatabaseType, Error, Model,
    Params, Result, Row, Statement,
};

const SEED: &str = r#"
    CREATE TABLE products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        price INTEGER NOT NULL
    );
    INSERT INTO products (name, price) VALUES ('lamp', 25), ('pencil', 2), ('desk', 120);

    CREATE TABLE customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE
    );
    INSERT INTO customers (email) VALUES ('ada@example.com');
"#;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn shop_options() -> ConnectionOptions {
    ConnectionOptions::builder("root", "x", "shop")
        .build()
        .expect("shop options should be valid")
}

#[derive(Default)]
pub struct SqliteConnector {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    last_dsn: Mutex<Option<String>>,
}

impl SqliteConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn last_dsn(&self) -> Option<String> {
        self.last_dsn.lock().expect("dsn lock").clone()
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn DatabaseConnection>> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| Error::Connection(e.to_string()))?;
        conn.execute_batch(SEED)
            .map_err(|e| Error::Connection(e.to_string()))?;

        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_dsn.lock().expect("dsn lock") = Some(options.connection_string());

        Ok(Box::new(SqliteConnection {
            conn,
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// Connector whose driver always refuses to connect
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, _options: &ConnectionOptions) -> Result<Box<dyn DatabaseConnection>> {
        Err(Error::query(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Access denied for user 'root'@'localhost'",
        )))
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: Params) -> Result<Statement> {
        let mut stmt = self.conn.prepare(sql).map_err(Error::query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = match &params {
            Params::Empty => stmt.query([]),
            Params::Positional(values) => {
                stmt.query(rusqlite::params_from_iter(values.iter().map(to_sql_value)))
            }
            Params::Named(values) => {
                let owned: Vec<(String, SqlValue)> = values
                    .iter()
                    .map(|(name, value)| {
                        let name = if name.starts_with(':') {
                            name.clone()
                        } else {
                            format!(":{}", name)
                        };
                        (name, to_sql_value(value))
                    })
                    .collect();
                let named: Vec<(&str, &dyn rusqlite::ToSql)> = owned
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
                    .collect();
                stmt.query(named.as_slice())
            }
        }
        .map_err(Error::query)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(Error::query)? {
            let mut map = Row::new();
            for (index, name) in columns.iter().enumerate() {
                let value = row.get_ref(index).map_err(Error::query)?;
                map.insert(name.clone(), from_sql_value(value));
            }
            result.push(map);
        }
        drop(rows);

        let mut statement = Statement::new(columns, result);
        if statement.column_count() == 0 {
            statement = statement
                .with_affected_rows(u64::try_from(self.conn.changes()).unwrap_or_default())
                .with_last_insert_id(u64::try_from(self.conn.last_insert_rowid()).ok());
        }
        Ok(statement)
    }

    fn driver(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// `SELECT COUNT(*)` over one of the seeded tables
async fn count_rows(conn: &BoundConnection, table: &str) -> Result<i64> {
    let row = conn
        .query_single_row(&format!("SELECT COUNT(*) AS n FROM {}", table), ())
        .await?;
    Ok(row.and_then(|row| row.get("n").and_then(Value::as_i64)).unwrap_or_default())
}

#[derive(Debug)]
pub struct ProductModel {
    conn: BoundConnection,
}

impl Model for ProductModel {
    fn bind(conn: BoundConnection) -> Self {
        Self { conn }
    }
}

impl ProductModel {
    pub async fn is_connected(&self) -> bool {
        self.conn.is_connected().await
    }

    pub async fn priced_above(&self, min_price: i64) -> Result<Vec<Row>> {
        self.conn
            .query_multiple_rows(
                "SELECT id, name FROM products WHERE price > ? ORDER BY id",
                vec![Value::from(min_price)],
            )
            .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<Row>> {
        self.conn
            .query_single_row("SELECT id, name, price FROM products WHERE id = ?", vec![Value::from(id)])
            .await
    }

    pub async fn exists_named(&self, name: &str) -> Result<bool> {
        self.conn
            .row_exists(
                "SELECT COUNT(*) FROM products WHERE name = :name",
                vec![("name", Value::from(name))],
            )
            .await
    }

    /// Plain `SELECT id`, so no match means no row at all
    pub async fn any_cheaper_than(&self, price: i64) -> Result<bool> {
        self.conn
            .row_exists("SELECT id FROM products WHERE price < ?", vec![Value::from(price)])
            .await
    }

    pub async fn search(&self, name: &str) -> Result<Statement> {
        self.conn
            .raw_query(
                "SELECT id, name, price FROM products WHERE name = ?",
                vec![Value::from(name)],
            )
            .await
    }

    /// Customers as seen from this model's own connection
    pub async fn customer_count(&self) -> Result<i64> {
        count_rows(&self.conn, "customers").await
    }

    /// Name lookup straight through the driver handle
    pub async fn name_via_handle(&self, id: i64) -> Result<(DatabaseType, Option<Value>)> {
        let mut handle = self.conn.connection_handle().await?;
        let driver = handle.driver();
        let mut stmt = handle
            .execute("SELECT name FROM products WHERE id = ?", vec![Value::from(id)].into())
            .await?;
        Ok((driver, stmt.fetch_column()))
    }
}

#[derive(Debug)]
pub struct CustomerModel {
    conn: BoundConnection,
}

impl Model for CustomerModel {
    fn bind(conn: BoundConnection) -> Self {
        Self { conn }
    }
}

impl CustomerModel {
    pub async fn is_connected(&self) -> bool {
        self.conn.is_connected().await
    }

    pub async fn register(&self, email: &str) -> Result<Statement> {
        self.conn
            .raw_query("INSERT INTO customers (email) VALUES (?)", vec![Value::from(email)])
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        count_rows(&self.conn, "customers").await
    }

    pub async fn emails(&self) -> Result<Statement> {
        self.conn
            .raw_query("SELECT email FROM customers ORDER BY id", ())
            .await
    }

    /// Reads a table that was never created
    pub async fn legacy_accounts(&self) -> Result<Vec<Row>> {
        self.conn
            .query_multiple_rows("SELECT * FROM legacy_accounts", ())
            .await
    }
}
