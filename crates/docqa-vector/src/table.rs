//! LanceDB connection and housekeeping helpers.
//!
//! Provides the database open function and a small key/value `meta` table
//! used to store index descriptors and the active index pointer.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;

use docqa_core::{Error, Result};

use crate::schema::meta_schema;

pub async fn open_db(path: &Path) -> Result<Connection> {
    connect(path.to_string_lossy().as_ref()).execute().await.map_err(Error::external)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(table_names(conn).await?.iter().any(|n| n == name))
}

pub async fn table_names(conn: &Connection) -> Result<Vec<String>> {
    conn.table_names().execute().await.map_err(Error::external)
}

pub async fn drop_table(conn: &Connection, name: &str) -> Result<()> {
    conn.drop_table(name, &[]).await.map_err(Error::external)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::external)?;
    Ok(())
}

/// Upsert `entries` in one commit; `key` is unique.
pub async fn set_meta(conn: &Connection, table: &str, entries: &[(String, String)]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    ensure_table(conn, table, meta_schema()).await?;
    let t = conn.open_table(table).execute().await.map_err(Error::external)?;
    let now = Utc::now().timestamp_millis();
    let rb = RecordBatch::try_new(
        meta_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|(k, _)| k.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|(_, v)| v.as_str()))),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
        ],
    )
    .map_err(Error::external)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), meta_schema()));
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(Error::external)?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? {
        return Ok(None);
    }
    let t = conn.open_table(table).execute().await.map_err(Error::external)?;
    let mut stream = t
        .query()
        .only_if(format!("key = '{}'", key.replace('\'', "''")))
        .execute()
        .await
        .map_err(Error::external)?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(Error::external)? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::ExternalService("meta.value column missing".into()))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

/// Remove the meta rows named by `keys`.
pub async fn delete_meta(conn: &Connection, table: &str, keys: &[String]) -> Result<()> {
    if keys.is_empty() || !table_exists(conn, table).await? {
        return Ok(());
    }
    let t = conn.open_table(table).execute().await.map_err(Error::external)?;
    let list: Vec<String> = keys.iter().map(|k| format!("'{}'", k.replace('\'', "''"))).collect();
    t.delete(&format!("key IN ({})", list.join(", "))).await.map_err(Error::external)?;
    Ok(())
}
