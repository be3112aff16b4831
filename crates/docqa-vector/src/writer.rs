use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use docqa_core::{Error, Result};

use crate::index::{VectorIndex, METRIC};
use crate::schema::{chunks_schema, CHUNKS_TABLE_PREFIX, META_TABLE};
use crate::table::{delete_meta, drop_table, get_meta, open_db, set_meta, table_exists, table_names};

/// Meta key of the pointer to the table queries should read.
pub const ACTIVE_INDEX_KEY: &str = "active_index";

/// Per-table descriptor fields recorded in `meta`.
const DESCRIPTOR_FIELDS: [&str; 4] = ["dim", "metric", "embedder_id", "entries"];

pub fn table_name(build_id: &str) -> String {
	format!("{CHUNKS_TABLE_PREFIX}{build_id}")
}

pub fn meta_key(table: &str, field: &str) -> String {
	format!("index:{table}:{field}")
}

/// Write `index` as a fresh table under `location`, record its descriptor,
/// then flip the active pointer. Readers see the previous index until the
/// flip and the complete new one after it.
///
/// After the flip only the new table and the one it replaced are kept; the
/// replaced table stays readable for loads that resolved the old pointer.
pub async fn persist(index: &VectorIndex, location: &Path) -> Result<()> {
	std::fs::create_dir_all(location)
		.map_err(|e| Error::ExternalService(format!("cannot create index directory {}: {e}", location.display())))?;
	let db = open_db(location).await?;
	let table = table_name(index.build_id());

	if table_exists(&db, &table).await? {
		return Err(Error::ExternalService(format!("index table '{table}' already exists")));
	}
	let batch = to_record_batch(index)?;
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	db.create_table(&table, reader).execute().await.map_err(Error::external)?;

	set_meta(
		&db,
		META_TABLE,
		&[
			(meta_key(&table, "dim"), index.dim().to_string()),
			(meta_key(&table, "metric"), METRIC.to_string()),
			(meta_key(&table, "embedder_id"), index.embedder_id().to_string()),
			(meta_key(&table, "entries"), index.len().to_string()),
		],
	)
	.await?;
	let previous = get_meta(&db, META_TABLE, ACTIVE_INDEX_KEY).await?;
	set_meta(&db, META_TABLE, &[(ACTIVE_INDEX_KEY.to_string(), table.clone())]).await?;
	info!(table = %table, entries = index.len(), location = %location.display(), "persisted vector index");

	prune_superseded(&db, &table, previous.as_deref()).await;
	Ok(())
}

/// Drop every `chunks_*` table other than `active` and `previous`.
/// Failures are logged; the new index is already live.
async fn prune_superseded(db: &Connection, active: &str, previous: Option<&str>) {
	let names = match table_names(db).await {
		Ok(names) => names,
		Err(e) => {
			warn!(error = %e, "cannot list index tables for pruning");
			return;
		}
	};
	for name in names {
		if !name.starts_with(CHUNKS_TABLE_PREFIX) || name == active || Some(name.as_str()) == previous {
			continue;
		}
		if let Err(e) = drop_table(db, &name).await {
			warn!(table = %name, error = %e, "failed to drop superseded index table");
			continue;
		}
		let keys: Vec<String> = DESCRIPTOR_FIELDS.iter().map(|f| meta_key(&name, f)).collect();
		if let Err(e) = delete_meta(db, META_TABLE, &keys).await {
			warn!(table = %name, error = %e, "failed to remove descriptor of dropped table");
		}
		debug!(table = %name, "dropped superseded index table");
	}
}

fn to_record_batch(index: &VectorIndex) -> Result<RecordBatch> {
	let dim = i32::try_from(index.dim()).map_err(|_| Error::InvalidInput(format!("dimension {} too large", index.dim())))?;
	let entries = index.entries();
	let mut metadata = Vec::with_capacity(entries.len());
	for e in entries {
		metadata.push(serde_json::to_string(&e.chunk.metadata).map_err(Error::external)?);
	}
	let vectors = entries.iter().map(|e| Some(e.vector.iter().copied().map(Some).collect::<Vec<_>>()));
	RecordBatch::try_new(chunks_schema(dim), vec![
		Arc::new(UInt32Array::from_iter_values(entries.iter().map(|e| e.id))),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.chunk.id.as_str()))),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.chunk.doc_id.as_str()))),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.chunk.doc_path.as_str()))),
		Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.chunk.content.as_str()))),
		Arc::new(Int32Array::from_iter_values(entries.iter().map(|e| e.chunk.chunk_index as i32))),
		Arc::new(Int32Array::from_iter_values(entries.iter().map(|e| e.chunk.total_chunks as i32))),
		Arc::new(StringArray::from(metadata)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
	])
	.map_err(Error::external)
}
