//! Fixed DDL for the four backing tables plus the columnar-replica
//! directives. Translated from `table/create.go` and `table/alter.go`,
//! with `flash_metrics_index`'s primary key spanning every slot column
//! (the variant keyed only on `(metric_name, label0)` is a known-bad source
//! variant per spec §9 and is not reproduced here) and `flash_metrics_data`
//! hash-partitioned on `tsid` as the distilled spec's DDL adds.

pub const MAX_LABEL_COUNT: usize = crate::model::MAX_LABEL_COUNT;

pub const CREATE_META: &str = "
CREATE TABLE IF NOT EXISTS flash_metrics_meta (
    metric_name VARCHAR(255) NOT NULL,
    label_name VARCHAR(255) NOT NULL,
    label_id TINYINT NOT NULL,
    PRIMARY KEY (metric_name, label_name)
);
";

pub const CREATE_INDEX: &str = "
CREATE TABLE IF NOT EXISTS flash_metrics_index (
    metric_name CHAR(128) NOT NULL,
    label0 CHAR(128),
    label1 CHAR(128),
    label2 CHAR(128),
    label3 CHAR(128),
    label4 CHAR(128),
    label5 CHAR(128),
    label6 CHAR(128),
    label7 CHAR(128),
    label8 CHAR(128),
    label9 CHAR(128),
    label10 CHAR(128),
    label11 CHAR(128),
    label12 CHAR(128),
    label13 CHAR(128),
    label14 CHAR(128),
    PRIMARY KEY (metric_name, label0, label1,
      label2, label3, label4, label5, label6,
      label7, label8, label9, label10, label11,
      label12, label13, label14)
);
";

pub const CREATE_UPDATE: &str = "
CREATE TABLE IF NOT EXISTS flash_metrics_update (
    tsid BIGINT NOT NULL,
    updated_date DATE NOT NULL,
    PRIMARY KEY (tsid, updated_date) CLUSTERED
);
";

pub const CREATE_DATA: &str = "
CREATE TABLE IF NOT EXISTS flash_metrics_data (
    tsid BIGINT NOT NULL,
    ts TIMESTAMP(3) NOT NULL,
    v DOUBLE
) PARTITION BY HASH(tsid) PARTITIONS 64;
";

pub const ALTER_TIFLASH_INDEX: &str = "ALTER TABLE flash_metrics_index SET TIFLASH REPLICA 1;";
pub const ALTER_TIFLASH_UPDATE: &str = "ALTER TABLE flash_metrics_update SET TIFLASH REPLICA 1;";
pub const ALTER_TIFLASH_DATA: &str = "ALTER TABLE flash_metrics_data SET TIFLASH REPLICA 1;";

pub const DROP_ALL: &[&str] = &[
    "DROP TABLE IF EXISTS flash_metrics_data;",
    "DROP TABLE IF EXISTS flash_metrics_update;",
    "DROP TABLE IF EXISTS flash_metrics_index;",
    "DROP TABLE IF EXISTS flash_metrics_meta;",
];

/// Create all four tables (idempotent) and set their columnar replicas.
///
/// Columnar-replica requests are best-effort: a single-node dev TiDB without
/// a TiFlash peer will return an error here, which we log and ignore rather
/// than fail startup over — the primary (row-store) tables remain fully
/// functional without it.
pub async fn bootstrap(pool: &sqlx::MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_META).execute(pool).await?;
    sqlx::query(CREATE_INDEX).execute(pool).await?;
    sqlx::query(CREATE_UPDATE).execute(pool).await?;
    sqlx::query(CREATE_DATA).execute(pool).await?;

    for alter in [ALTER_TIFLASH_INDEX, ALTER_TIFLASH_UPDATE, ALTER_TIFLASH_DATA] {
        if let Err(e) = sqlx::query(alter).execute(pool).await {
            tracing::warn!(error = %e, statement = alter, "failed to set TiFlash replica, continuing without it");
        }
    }

    Ok(())
}

/// Drop all four tables. Used by `--cleanup` on shutdown, and by
/// integration tests to reset state between runs.
pub async fn teardown(pool: &sqlx::MySqlPool) -> Result<(), sqlx::Error> {
    for stmt in DROP_ALL {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
