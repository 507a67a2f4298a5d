//! SQL Server connector over the TDS protocol (tiberius).

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use tiberius::{AuthMethod, Client, ColumnType, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::Connector;
use crate::error::{classify_tiberius, Error, Result};
use crate::models::{ColumnSchema, ConnectionConfig, TableSchema, TabularResult};

type TdsClient = Client<Compat<TcpStream>>;

pub struct SqlServerConnector {
    client: Option<TdsClient>,
}

fn build_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Config("host is required".to_string()))?;
    let username = config
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::Config("username is required".to_string()))?;

    let mut tds = Config::new();
    tds.host(host);
    tds.port(config.port.unwrap_or_else(|| config.kind.default_port()));
    if let Some(database) = config.database.as_deref() {
        tds.database(database);
    }
    tds.authentication(AuthMethod::sql_server(
        username,
        config.password.as_deref().unwrap_or(""),
    ));
    tds.trust_cert();
    Ok(tds)
}

async fn open_client(config: &ConnectionConfig) -> Result<TdsClient> {
    let tds = build_config(config)?;
    let tcp = TcpStream::connect(tds.get_addr())
        .await
        .map_err(|e| Error::Network(e.to_string()))?;
    tcp.set_nodelay(true)
        .map_err(|e| Error::Network(e.to_string()))?;

    Client::connect(tds, tcp.compat_write())
        .await
        .map_err(classify_tiberius)
}

pub async fn list_databases(config: &ConnectionConfig) -> Result<Vec<String>> {
    let mut client = open_client(config).await?;
    let rows = client
        .query("SELECT name FROM sys.databases WHERE database_id > 4 ORDER BY name", &[])
        .await
        .map_err(classify_tiberius)?
        .into_first_result()
        .await
        .map_err(classify_tiberius)?;

    let names = rows
        .iter()
        .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten())
        .map(|s| s.to_string())
        .collect();
    client.close().await.map_err(classify_tiberius)?;
    Ok(names)
}

impl SqlServerConnector {
    pub fn new() -> Self {
        SqlServerConnector { client: None }
    }

    fn client(&mut self) -> Result<&mut TdsClient> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::NotConnected("sqlserver handle not open".to_string()))
    }
}

impl Default for SqlServerConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.client = Some(open_client(config).await?);
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<TabularResult> {
        let rows = self
            .client()?
            .query(sql, &[])
            .await
            .map_err(classify_tiberius)?
            .into_first_result()
            .await
            .map_err(classify_tiberius)?;

        let Some(first) = rows.first() else {
            return Ok(TabularResult::default());
        };

        let headers: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let column_types: Vec<ColumnType> =
            first.columns().iter().map(|c| c.column_type()).collect();

        let data = rows
            .iter()
            .map(|row| {
                column_types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| extract_value(row, i, *ty))
                    .collect()
            })
            .collect();

        Ok(TabularResult { headers, rows: data })
    }

    async fn schema(&mut self) -> Result<Vec<TableSchema>> {
        let rows = self
            .client()?
            .query(
                r#"
                SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE
                FROM INFORMATION_SCHEMA.COLUMNS
                ORDER BY TABLE_NAME, ORDINAL_POSITION
                "#,
                &[],
            )
            .await
            .map_err(classify_tiberius)?
            .into_first_result()
            .await
            .map_err(classify_tiberius)?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in &rows {
            let table_name = row
                .try_get::<&str, _>(0)
                .map_err(classify_tiberius)?
                .unwrap_or_default()
                .to_string();
            let column = ColumnSchema {
                name: row
                    .try_get::<&str, _>(1)
                    .map_err(classify_tiberius)?
                    .unwrap_or_default()
                    .to_string(),
                data_type: row
                    .try_get::<&str, _>(2)
                    .map_err(classify_tiberius)?
                    .unwrap_or_default()
                    .to_string(),
            };
            match tables.last_mut() {
                Some(t) if t.table_name == table_name => t.columns.push(column),
                _ => tables.push(TableSchema {
                    table_name,
                    columns: vec![column],
                }),
            }
        }
        Ok(tables)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await.map_err(classify_tiberius)?;
        }
        Ok(())
    }
}

/// Decode one cell by its TDS column type. Variable-width integer and
/// datetime columns (`Intn`, `Datetimen`) try the widest decoding first.
fn extract_value(row: &tiberius::Row, index: usize, ty: ColumnType) -> serde_json::Value {
    use serde_json::Value;

    match ty {
        ColumnType::Null => Value::Null,
        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        ColumnType::Int1 => int_value(row.try_get::<u8, _>(index).ok().flatten().map(i64::from)),
        ColumnType::Int2 => int_value(row.try_get::<i16, _>(index).ok().flatten().map(i64::from)),
        ColumnType::Int4 => int_value(row.try_get::<i32, _>(index).ok().flatten().map(i64::from)),
        ColumnType::Int8 => int_value(row.try_get::<i64, _>(index).ok().flatten()),
        ColumnType::Intn => {
            let widest = row
                .try_get::<i64, _>(index)
                .ok()
                .flatten()
                .or_else(|| row.try_get::<i32, _>(index).ok().flatten().map(i64::from))
                .or_else(|| row.try_get::<i16, _>(index).ok().flatten().map(i64::from))
                .or_else(|| row.try_get::<u8, _>(index).ok().flatten().map(i64::from));
            int_value(widest)
        }
        ColumnType::Float4 => {
            float_value(row.try_get::<f32, _>(index).ok().flatten().map(f64::from))
        }
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => {
            float_value(row.try_get::<f64, _>(index).ok().flatten())
        }
        ColumnType::Floatn => {
            let widest = row
                .try_get::<f64, _>(index)
                .ok()
                .flatten()
                .or_else(|| row.try_get::<f32, _>(index).ok().flatten().map(f64::from));
            float_value(widest)
        }
        ColumnType::Decimaln | ColumnType::Numericn => {
            match row.try_get::<rust_decimal::Decimal, _>(index).ok().flatten() {
                Some(d) => d
                    .to_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(d.to_string())),
                None => Value::Null,
            }
        }
        ColumnType::Guid => row
            .try_get::<uuid::Uuid, _>(index)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        ColumnType::DatetimeOffsetn => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        ColumnType::Daten => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        ColumnType::Timen => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        ColumnType::BigBinary | ColumnType::BigVarBin | ColumnType::Image => row
            .try_get::<&[u8], _>(index)
            .ok()
            .flatten()
            .map(|bytes| Value::String(format!("0x{}", hex::encode(bytes))))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<&str, _>(index)
            .ok()
            .flatten()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
    }
}

fn int_value(v: Option<i64>) -> serde_json::Value {
    v.map(|n| serde_json::Value::Number(n.into()))
        .unwrap_or(serde_json::Value::Null)
}

fn float_value(v: Option<f64>) -> serde_json::Value {
    match v {
        Some(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(n.to_string())),
        None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseKind;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            id: "db_3".into(),
            name: "erp".into(),
            kind: DatabaseKind::SqlServer,
            host: Some("sql.local".into()),
            port: None,
            database: Some("erp".into()),
            username: Some("sa".into()),
            password: Some("secret".into()),
            file_path: None,
            file_content: None,
        }
    }

    #[test]
    fn config_defaults_the_tds_port() {
        let tds = build_config(&config()).unwrap();
        assert_eq!(tds.get_addr(), "sql.local:1433");
    }

    #[test]
    fn missing_host_is_a_config_error() {
        let mut c = config();
        c.host = Some(String::new());
        assert!(matches!(build_config(&c).err(), Some(Error::Config(_))));
    }

    #[tokio::test]
    async fn execute_before_connect_is_not_connected() {
        let mut connector = SqlServerConnector::new();
        assert!(matches!(
            connector.execute("SELECT 1").await.err(),
            Some(Error::NotConnected(_))
        ));
    }
}
