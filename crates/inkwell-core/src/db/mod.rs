//! Database layer for Inkwell

mod account_repository;
mod baseline_repository;
mod connection;
mod migrations;
mod settings_repository;
mod sync_config_repository;

pub use account_repository::{AccountRepository, LibSqlAccountRepository};
pub use baseline_repository::{BaselineRepository, LibSqlBaselineRepository};
pub use connection::Database;
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
pub use sync_config_repository::{LibSqlSyncConfigRepository, SyncConfigRepository};

use crate::error::Result;
use libsql::{Row, Value};

/// Read a nullable TEXT column.
fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(crate::error::Error::Database(format!(
            "Expected TEXT in column {idx}, found {other:?}"
        ))),
    }
}

/// Read a nullable INTEGER column.
fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(crate::error::Error::Database(format!(
            "Expected INTEGER in column {idx}, found {other:?}"
        ))),
    }
}

fn nullable_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn nullable_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
