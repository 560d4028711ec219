//! PostgreSQL connections using `tokio-postgres`.
//!
//! Each [`PostgresConnection`] owns one client; pooling is done by
//! [`Pool`](crate::pool::Pool). Statements are prepared first so bind values
//! can be converted to the exact parameter types the server inferred.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlweave_core::{SqlError, SqlResult};
use sqlweave_db::{
    BindParameterSet, CompiledQuery, Connection, DialectDescriptor, Executor, RawRowSet, Row,
    Value,
};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};

use crate::config::ConnectionConfig;
use crate::errors::{connect_failure, from_postgres};
use crate::pool::Connector;

type Param = Box<dyn ToSql + Sync + Send>;

/// Opens [`PostgresConnection`]s for a pool.
pub struct PostgresConnector {
    config: ConnectionConfig,
}

impl PostgresConnector {
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn pg_config(&self) -> SqlResult<tokio_postgres::Config> {
        let cfg = &self.config;
        let mut pg = tokio_postgres::Config::new();
        pg.host(cfg.host_or_default()).dbname(&cfg.database);
        if let Some(port) = cfg.port {
            pg.port(port);
        }
        if let Some(user) = &cfg.user {
            pg.user(user);
        }
        if let Some(password) = &cfg.password {
            pg.password(password);
        }
        if let Some(name) = cfg.option_str("application_name") {
            pg.application_name(name);
        }
        if let Some(options) = cfg.option_str("options") {
            pg.options(options);
        }
        if let Some(secs) = cfg.options.get("connect_timeout").and_then(serde_json::Value::as_u64) {
            pg.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(keepalives) = cfg.options.get("keepalives").and_then(serde_json::Value::as_bool) {
            pg.keepalives(keepalives);
        }
        match cfg.option_str("ssl_mode") {
            None | Some("disable" | "prefer") => {}
            Some(mode) => {
                return Err(SqlError::InvalidConnection {
                    dialect: cfg.dialect.name().to_string(),
                    message: format!("ssl_mode '{mode}' requires TLS, which this build does not include"),
                })
            }
        }
        Ok(pg)
    }

    /// Session settings applied right after connecting.
    fn session_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(encoding) = self.config.option_str("client_encoding") {
            statements.push(format!("SET client_encoding = '{}'", encoding.replace('\'', "''")));
        }
        if let Some(ms) = self
            .config
            .options
            .get("statement_timeout")
            .and_then(serde_json::Value::as_u64)
        {
            statements.push(format!("SET statement_timeout = {ms}"));
        }
        statements
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.config.dialect
    }

    async fn connect(&self) -> SqlResult<Box<dyn Connection>> {
        let name = self.config.dialect.name();
        let (client, connection) = self
            .pg_config()?
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| connect_failure(name, from_postgres(name, &e)))?;

        let dialect = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(dialect = %dialect, error = %e, "PostgreSQL connection closed with an error");
            }
        });

        for sql in self.session_statements() {
            client
                .batch_execute(&sql)
                .await
                .map_err(|e| connect_failure(name, from_postgres(name, &e)))?;
        }
        Ok(Box::new(PostgresConnection {
            dialect: Arc::clone(&self.config.dialect),
            client,
            broken: AtomicBool::new(false),
        }))
    }
}

/// SQL NULL for a parameter of any type.
#[derive(Debug)]
struct Null;

impl ToSql for Null {
    fn to_sql(
        &self,
        _: &Type,
        _: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// A `NUMERIC` read back as its exact decimal text.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        decode_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decodes the binary `NUMERIC` format: digit count, weight, sign and
/// display scale, followed by base-10000 digits.
fn decode_numeric(raw: &[u8]) -> Result<String, Box<dyn StdError + Sync + Send>> {
    let word = |i: usize| -> Result<u16, Box<dyn StdError + Sync + Send>> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric".into())
    };
    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits).map(|i| word(4 + i)).collect::<Result<Vec<_>, _>>()?;

    let mut int_part = String::new();
    for pos in 0..=weight.max(0) {
        let digit = usize::try_from(pos).ok().and_then(|p| digits.get(p)).copied().unwrap_or(0);
        if weight < 0 {
            break;
        }
        if int_part.is_empty() {
            int_part.push_str(&digit.to_string());
        } else {
            int_part.push_str(&format!("{digit:04}"));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let mut frac = String::new();
    let mut pos = weight + 1;
    while frac.len() < dscale {
        let digit = if pos < 0 {
            0
        } else {
            usize::try_from(pos).ok().and_then(|p| digits.get(p)).copied().unwrap_or(0)
        };
        frac.push_str(&format!("{digit:04}"));
        pos += 1;
    }
    frac.truncate(dscale);

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    out.push_str(&int_part);
    if dscale > 0 {
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// One PostgreSQL client.
pub struct PostgresConnection {
    dialect: Arc<DialectDescriptor>,
    client: tokio_postgres::Client,
    broken: AtomicBool,
}

impl PostgresConnection {
    /// Converts a wire value to the parameter type the server expects.
    fn to_param(value: &Value, ty: &Type) -> Param {
        match value {
            Value::Null => Box::new(Null),
            Value::Bool(b) => Box::new(*b),
            Value::Int(i) => match *ty {
                Type::INT2 => match i16::try_from(*i) {
                    Ok(v) => Box::new(v),
                    Err(_) => Box::new(*i),
                },
                Type::INT4 => match i32::try_from(*i) {
                    Ok(v) => Box::new(v),
                    Err(_) => Box::new(*i),
                },
                Type::FLOAT8 => Box::new(*i as f64),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(i.to_string()),
                _ => Box::new(*i),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => Box::new(*f as f32),
                Type::TEXT | Type::VARCHAR => Box::new(f.to_string()),
                _ => Box::new(*f),
            },
            Value::Decimal(s) | Value::String(s) => match *ty {
                Type::UUID => match uuid::Uuid::parse_str(s) {
                    Ok(u) => Box::new(u),
                    Err(_) => Box::new(s.clone()),
                },
                Type::JSON | Type::JSONB => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(j) => Box::new(j),
                    Err(_) => Box::new(s.clone()),
                },
                _ => Box::new(s.clone()),
            },
            Value::Bytes(b) => Box::new(b.clone()),
            Value::Date(d) => Box::new(*d),
            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMPTZ => Box::new(dt.and_utc()),
                _ => Box::new(*dt),
            },
            Value::DateTimeTz(dt) => match *ty {
                Type::TIMESTAMP => Box::new(dt.naive_utc()),
                _ => Box::new(*dt),
            },
            Value::Time(t) => Box::new(*t),
            Value::Uuid(u) => Box::new(*u),
            Value::Json(j) => match *ty {
                Type::TEXT | Type::VARCHAR => Box::new(j.to_string()),
                _ => Box::new(j.clone()),
            },
            Value::HStore(map) => {
                let map: HashMap<String, Option<String>> =
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Box::new(map)
            }
            other => Box::new(other.to_string()),
        }
    }

    fn params(&self, binds: &BindParameterSet, types: &[Type]) -> SqlResult<Vec<Param>> {
        let values = binds.as_positional().ok_or_else(|| {
            SqlError::invalid_descriptor(self.dialect.name(), "PostgreSQL takes positional binds only")
        })?;
        if values.len() != types.len() {
            return Err(SqlError::invalid_descriptor(
                self.dialect.name(),
                format!("statement expects {} binds, got {}", types.len(), values.len()),
            ));
        }
        Ok(values.iter().zip(types).map(|(v, ty)| Self::to_param(v, ty)).collect())
    }

    fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, i: usize) -> Option<T> {
        row.try_get::<_, Option<T>>(i).ok().flatten()
    }

    /// Converts a `tokio_postgres::Row` to our generic `Row`.
    fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
        let columns: Vec<String> = pg_row.columns().iter().map(|c| c.name().to_string()).collect();
        let values = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let value = match *col.type_() {
                    Type::BOOL => Self::get(pg_row, i).map(Value::Bool),
                    Type::INT2 => Self::get::<i16>(pg_row, i).map(|v| Value::Int(i64::from(v))),
                    Type::INT4 => Self::get::<i32>(pg_row, i).map(|v| Value::Int(i64::from(v))),
                    Type::INT8 => Self::get(pg_row, i).map(Value::Int),
                    Type::FLOAT4 => Self::get::<f32>(pg_row, i).map(|v| Value::Float(f64::from(v))),
                    Type::FLOAT8 => Self::get(pg_row, i).map(Value::Float),
                    Type::NUMERIC => Self::get::<NumericText>(pg_row, i).map(|n| Value::Decimal(n.0)),
                    Type::BYTEA => Self::get(pg_row, i).map(Value::Bytes),
                    Type::UUID => Self::get(pg_row, i).map(Value::Uuid),
                    Type::DATE => Self::get(pg_row, i).map(Value::Date),
                    Type::TIMESTAMP => Self::get(pg_row, i).map(Value::DateTime),
                    Type::TIMESTAMPTZ => Self::get::<chrono::DateTime<chrono::Utc>>(pg_row, i)
                        .map(|dt| Value::DateTimeTz(dt.into())),
                    Type::TIME => Self::get(pg_row, i).map(Value::Time),
                    Type::JSON | Type::JSONB => Self::get(pg_row, i).map(Value::Json),
                    _ => Self::get(pg_row, i).map(Value::String),
                };
                value.unwrap_or(Value::Null)
            })
            .collect();
        Row::new(columns, values)
    }

    fn fail(&self, error: &tokio_postgres::Error) -> SqlError {
        let err = from_postgres(self.dialect.name(), error);
        if matches!(err, SqlError::ConnectionLost { .. }) || self.client.is_closed() {
            self.broken.store(true, Ordering::SeqCst);
        }
        err
    }
}

#[async_trait]
impl Executor for PostgresConnection {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        tracing::debug!(dialect = %self.dialect.name(), sql = %query.sql, binds = query.binds.len(), "Executing statement");
        let stmt = self.client.prepare(&query.sql).await.map_err(|e| self.fail(&e))?;
        let params = self.params(&query.binds, stmt.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        if stmt.columns().is_empty() {
            let affected = self.client.execute(&stmt, &refs).await.map_err(|e| self.fail(&e))?;
            return Ok(RawRowSet::affected(affected));
        }
        let rows = self.client.query(&stmt, &refs).await.map_err(|e| self.fail(&e))?;
        Ok(RawRowSet::from_rows(rows.iter().map(Self::convert_row).collect()))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn is_valid(&self) -> bool {
        !self.client.is_closed() && self.client.simple_query("SELECT 1").await.is_ok()
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst) || self.client.is_closed()
    }
}
