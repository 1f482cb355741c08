//! MySQL driver implementation

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use mysql_async::prelude::*;
use serde_json::{Number, Value};
use url::Url;

use crate::db::connection::{ConnectionOptions, DatabaseType};
use crate::db::driver::DatabaseConnection;
use crate::db::error::{Error, Result};
use crate::db::value::{Params, Row, Statement};

pub struct MySqlConnection {
    conn: mysql_async::Conn,
}

impl MySqlConnection {
    /// Connect using the shared options.
    ///
    /// `mysql_async` reports every failure as an `Err` and always prepares
    /// statements on the server, so no extra session flags are needed beyond
    /// the character set.
    pub async fn open(options: &ConnectionOptions) -> Result<Self> {
        let conn = mysql_async::Conn::new(driver_opts(options)?)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self { conn })
    }
}

/// Driver options parsed from [`ConnectionOptions::url`].
///
/// `mysql_async` rejects query parameters it does not know, so the charset
/// is dropped from the url and applied with `SET NAMES` on connect.
fn driver_opts(options: &ConnectionOptions) -> Result<mysql_async::Opts> {
    let mut url = Url::parse(&options.url()?)
        .map_err(|e| Error::Configuration(format!("invalid connection url: {}", e)))?;
    url.set_query(None);

    let opts = mysql_async::Opts::from_url(url.as_str())
        .map_err(|e| Error::Configuration(e.to_string()))?;

    Ok(mysql_async::OptsBuilder::from_opts(opts)
        .init(vec![format!("SET NAMES {}", options.charset())])
        .into())
}

#[async_trait]
impl DatabaseConnection for MySqlConnection {
    async fn execute(&mut self, sql: &str, params: Params) -> Result<Statement> {
        let mut result = self
            .conn
            .exec_iter(sql, to_mysql_params(params))
            .await
            .map_err(Error::query)?;

        // Read from the result set itself so an empty select keeps its columns
        let columns = result
            .columns_ref()
            .iter()
            .map(|column| column.name_str().into_owned())
            .collect();
        let rows: Vec<mysql_async::Row> = result.collect().await.map_err(Error::query)?;
        let affected_rows = result.affected_rows();
        let last_insert_id = result.last_insert_id();
        result.drop_result().await.map_err(Error::query)?;

        Ok(Statement::new(columns, rows.iter().map(row_to_map).collect())
            .with_affected_rows(affected_rows)
            .with_last_insert_id(last_insert_id))
    }

    fn driver(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

fn to_mysql_params(params: Params) -> mysql_async::Params {
    match params {
        Params::Empty => mysql_async::Params::Empty,
        Params::Positional(values) => {
            mysql_async::Params::Positional(values.iter().map(to_mysql_value).collect())
        }
        Params::Named(values) => mysql_async::Params::Named(
            values
                .iter()
                .map(|(name, value)| {
                    let name = name.strip_prefix(':').unwrap_or(name);
                    (name.as_bytes().to_vec(), to_mysql_value(value))
                })
                .collect::<HashMap<_, _>>(),
        ),
    }
}

fn to_mysql_value(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                mysql_async::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                mysql_async::Value::UInt(u)
            } else {
                mysql_async::Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        // Nested values go over the wire as JSON text
        Value::Array(_) | Value::Object(_) => {
            mysql_async::Value::Bytes(value.to_string().into_bytes())
        }
    }
}

fn row_to_map(row: &mysql_async::Row) -> Row {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let value = row.as_ref(index).map(from_mysql_value).unwrap_or(Value::Null);
            (column.name_str().into_owned(), value)
        })
        .collect()
}

fn from_mysql_value(value: &mysql_async::Value) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Int(i) => Value::from(*i),
        mysql_async::Value::UInt(u) => Value::from(*u),
        mysql_async::Value::Float(f) => float_value(f64::from(*f)),
        mysql_async::Value::Double(d) => float_value(*d),
        mysql_async::Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        },
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::String(text)
        }
        mysql_async::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::String(text)
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
