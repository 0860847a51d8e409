//! Live catalog introspection for the volatile store.

use sqlx::{Row, SqliteConnection};

use crate::types::{ColumnInfo, SchemaSnapshot, TableSchema, TableStat, TableStats};

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn table_names(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await
}

async fn table_columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<ColumnInfo>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            let not_null: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;
            Ok(ColumnInfo {
                name: row.try_get("name")?,
                declared_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                nullable: not_null == 0 && pk == 0,
            })
        })
        .collect()
}

async fn row_count(conn: &mut SqliteConnection, table: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
        .fetch_one(&mut *conn)
        .await
}

/// Tables and their columns as currently declared in the store.
pub async fn snapshot(conn: &mut SqliteConnection) -> Result<SchemaSnapshot, sqlx::Error> {
    let mut tables = Vec::new();
    for name in table_names(conn).await? {
        let columns = table_columns(conn, &name).await?;
        tables.push(TableSchema { name, columns });
    }
    Ok(SchemaSnapshot::new(tables))
}

/// Row counts per table, in snapshot order.
pub async fn stats(conn: &mut SqliteConnection) -> Result<TableStats, sqlx::Error> {
    let mut stats = Vec::new();
    for table in table_names(conn).await? {
        let row_count = row_count(conn, &table).await?;
        stats.push(TableStat { table, row_count });
    }
    Ok(TableStats(stats))
}

/// Snapshot and stats from a single pass over the catalog.
///
/// Callers hold the store lock, so both halves describe the same state.
pub async fn observe(
    conn: &mut SqliteConnection,
) -> Result<(SchemaSnapshot, TableStats), sqlx::Error> {
    let mut tables = Vec::new();
    let mut stats = Vec::new();
    for name in table_names(conn).await? {
        let columns = table_columns(conn, &name).await?;
        let row_count = row_count(conn, &name).await?;
        stats.push(TableStat {
            table: name.clone(),
            row_count,
        });
        tables.push(TableSchema { name, columns });
    }
    Ok((SchemaSnapshot::new(tables), TableStats(stats)))
}
