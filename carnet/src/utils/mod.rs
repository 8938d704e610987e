use crate::error::{BadgeError, BadgeResult};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::error;
use std::fmt::Display;
use std::path::Path;

mod base64bytes;
pub use base64bytes::Base64Byte;

pub trait IntoAnyhow<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E> IntoAnyhow<T> for Result<T, E>
where
    E: Display,
{
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow!(e.to_string()))
    }
}

pub trait IfNotFound<T> {
    fn if_not_found(self, what: impl Into<String>) -> BadgeResult<T>;
}

impl<T> IfNotFound<T> for Option<T> {
    fn if_not_found(self, what: impl Into<String>) -> BadgeResult<T> {
        match self {
            Some(t) => Ok(t),
            _ => Err(BadgeError::NotFound(what.into())),
        }
    }
}

pub trait IntoJsonRpcResult<T> {
    fn to_jsonrpc_result(self) -> jsonrpsee::core::RpcResult<T>;
}

impl<T> IntoJsonRpcResult<T> for BadgeResult<T> {
    fn to_jsonrpc_result(self) -> jsonrpsee::core::RpcResult<T> {
        self.map_err(|e| jsonrpsee::core::Error::Custom(e.to_string()))
    }
}

pub trait LogErr {
    fn log_error(self);
}

impl<T, E> LogErr for Result<T, E>
where
    E: Display,
{
    fn log_error(self) {
        if let Err(e) = self {
            error!("{}", e)
        }
    }
}

/// Milliseconds since epoch, the unit of every stored timestamp
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// sqlite refuse to open a missing database file unless asked to create it,
/// so create the file up front for `sqlite://` dsn
pub async fn ensure_db_file(dsn: &str) -> Result<()> {
    let path = match dsn.strip_prefix("sqlite://") {
        Some(rest) => rest.split('?').next().unwrap_or_default(),
        None => return Ok(()),
    };
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    let path = Path::new(path);
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::File::create(path).await?;
    Ok(())
}
