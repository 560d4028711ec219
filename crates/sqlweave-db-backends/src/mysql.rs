//! MySQL and MariaDB connections using `mysql_async`.
//!
//! Each [`MySqlConnection`] owns a single `mysql_async::Conn`; pooling is done
//! by [`Pool`](crate::pool::Pool). Statements with binds use the binary
//! protocol, statements without binds use the text protocol since MySQL
//! cannot prepare every transaction control statement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use sqlweave_core::{SqlError, SqlResult};
use sqlweave_db::{
    BindParameterSet, CompiledQuery, Connection, DialectDescriptor, Executor, RawRowSet, Row,
    Value,
};
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::errors::{connect_failure, from_mysql};
use crate::pool::Connector;

/// Opens [`MySqlConnection`]s for a pool.
pub struct MySqlConnector {
    config: ConnectionConfig,
}

impl MySqlConnector {
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn opts(&self) -> SqlResult<mysql_async::OptsBuilder> {
        let cfg = &self.config;
        if cfg.options.get("ssl").and_then(serde_json::Value::as_bool) == Some(true) {
            return Err(SqlError::InvalidConnection {
                dialect: cfg.dialect.name().to_string(),
                message: "ssl requires TLS, which this build does not include".to_string(),
            });
        }
        let mut opts = mysql_async::OptsBuilder::default()
            .ip_or_hostname(cfg.host_or_default())
            .tcp_port(cfg.port.unwrap_or(3306))
            .user(cfg.user.clone())
            .pass(cfg.password.clone())
            .db_name((!cfg.database.is_empty()).then(|| cfg.database.clone()));
        if let Some(socket) = cfg.option_str("socket") {
            opts = opts.socket(Some(socket.to_string()));
        }
        if let Some(size) = cfg.options.get("stmt_cache_size").and_then(serde_json::Value::as_u64) {
            opts = opts.stmt_cache_size(usize::try_from(size).unwrap_or(usize::MAX));
        }
        if let Some(charset) = cfg.option_str("charset") {
            opts = opts.init(vec![format!("SET NAMES {}", charset.replace(['\'', '`', ';'], ""))]);
        }
        Ok(opts)
    }

    fn connect_timeout(&self) -> Option<Duration> {
        self.config
            .options
            .get("connect_timeout")
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.config.dialect
    }

    async fn connect(&self) -> SqlResult<Box<dyn Connection>> {
        let name = self.config.dialect.name();
        let connecting = mysql_async::Conn::new(self.opts()?);
        let conn = match self.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| {
                SqlError::HostNotReachable {
                    dialect: name.to_string(),
                    message: format!("no answer within {}s", limit.as_secs()),
                }
            })?,
            None => connecting.await,
        }
        .map_err(|e| connect_failure(name, from_mysql(name, &e)))?;

        Ok(Box::new(MySqlConnection {
            dialect: Arc::clone(&self.config.dialect),
            conn: Mutex::new(conn),
            broken: AtomicBool::new(false),
        }))
    }
}

/// One MySQL or MariaDB session.
pub struct MySqlConnection {
    dialect: Arc<DialectDescriptor>,
    conn: Mutex<mysql_async::Conn>,
    broken: AtomicBool,
}

impl MySqlConnection {
    /// Converts wire values to `mysql_async` parameter values.
    fn to_params(&self, binds: &BindParameterSet) -> SqlResult<Vec<mysql_async::Value>> {
        let values = binds.as_positional().ok_or_else(|| {
            SqlError::invalid_descriptor(self.dialect.name(), "MySQL takes positional binds only")
        })?;
        Ok(values
            .iter()
            .map(|v| match v {
                Value::Null => mysql_async::Value::NULL,
                Value::Bool(b) => mysql_async::Value::from(*b),
                Value::Int(i) => mysql_async::Value::from(*i),
                Value::Float(f) => mysql_async::Value::from(*f),
                Value::Decimal(s) | Value::String(s) => mysql_async::Value::from(s.as_str()),
                Value::Bytes(b) => mysql_async::Value::from(b.as_slice()),
                Value::Json(j) => mysql_async::Value::from(j.to_string()),
                other => mysql_async::Value::from(other.to_string()),
            })
            .collect())
    }

    /// Converts a `mysql_async::Row` to our generic `Row`.
    fn convert_row(mysql_row: &mysql_async::Row) -> Row {
        let columns: Vec<String> = mysql_row
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();

        let values = (0..columns.len())
            .map(|i| match mysql_row.as_ref(i) {
                None | Some(mysql_async::Value::NULL) => Value::Null,
                Some(mysql_async::Value::Bytes(b)) => match String::from_utf8(b.clone()) {
                    Ok(s) => Value::String(s),
                    Err(_) => Value::Bytes(b.clone()),
                },
                Some(mysql_async::Value::Int(i)) => Value::Int(*i),
                Some(mysql_async::Value::UInt(u)) => {
                    i64::try_from(*u).map_or_else(|_| Value::Decimal(u.to_string()), Value::Int)
                }
                Some(mysql_async::Value::Float(f)) => Value::Float(f64::from(*f)),
                Some(mysql_async::Value::Double(d)) => Value::Float(*d),
                Some(mysql_async::Value::Date(y, mo, d, h, mi, s, us)) => {
                    chrono::NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*mo), u32::from(*d))
                        .and_then(|date| {
                            date.and_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                        })
                        .map_or(Value::Null, Value::DateTime)
                }
                Some(other) => Value::String(other.as_sql(true).trim_matches('\'').to_string()),
            })
            .collect();

        Row::new(columns, values)
    }

    fn fail(&self, error: &mysql_async::Error) -> SqlError {
        let err = from_mysql(self.dialect.name(), error);
        if matches!(err, SqlError::ConnectionLost { .. }) {
            self.broken.store(true, Ordering::SeqCst);
        }
        err
    }
}

#[async_trait]
impl Executor for MySqlConnection {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        tracing::debug!(dialect = %self.dialect.name(), sql = %query.sql, binds = query.binds.len(), "Executing statement");
        let mut conn = self.conn.lock().await;

        let (rows, affected) = if query.binds.is_empty() {
            let mut result = conn.query_iter(query.sql.as_str()).await.map_err(|e| self.fail(&e))?;
            let rows: Vec<mysql_async::Row> = result.collect().await.map_err(|e| self.fail(&e))?;
            (rows, result.affected_rows())
        } else {
            let params = mysql_async::Params::Positional(self.to_params(&query.binds)?);
            let mut result = conn
                .exec_iter(query.sql.as_str(), params)
                .await
                .map_err(|e| self.fail(&e))?;
            let rows: Vec<mysql_async::Row> = result.collect().await.map_err(|e| self.fail(&e))?;
            (rows, result.affected_rows())
        };

        if rows.is_empty() {
            return Ok(RawRowSet::affected(affected));
        }
        Ok(RawRowSet::from_rows(rows.iter().map(Self::convert_row).collect()))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn is_valid(&self) -> bool {
        self.conn.lock().await.ping().await.is_ok()
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}
