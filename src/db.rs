use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::Result;
use crate::fetch::DatabaseCache;

/// Opens the database file read-only. The file is never written to, so a
/// single connection is enough.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Makes sure the database is cached locally, then opens it.
pub async fn open(cache: &DatabaseCache) -> Result<SqlitePool> {
    let path = cache.ensure_database().await?;
    connect(&path).await
}
