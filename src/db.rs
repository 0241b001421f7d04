//! SQL connection pool construction.
//!
//! Mirrors `db::create_pool` from this crate's ancestor (`PgPoolOptions` →
//! `MySqlPoolOptions`, since TiDB speaks the MySQL wire protocol), with the
//! pool limits spec §5 calls out: max 10 open, max 10 idle, 3-minute
//! connection lifetime.
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::info;

/// Build a MySQL/TiDB connection URL from a bare `host:port` address.
///
/// The original service takes just `tidb.address` in its config and the
/// driver fills in the rest (no auth, `information_schema` style empty
/// database selection maps onto an explicit schema name here since sqlx
/// requires one).
#[must_use]
pub fn connection_url(tidb_address: &str) -> String {
    format!("mysql://root@{tidb_address}/test")
}

pub async fn create_pool(tidb_address: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(0)
        .max_lifetime(Duration::from_secs(3 * 60))
        .connect(&connection_url(tidb_address))
        .await?;

    info!(address = %tidb_address, "connected to TiDB");
    Ok(pool)
}
