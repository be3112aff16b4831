use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use std::path::Path;
use tracing::{debug, warn};

use docqa_core::types::{DocumentChunk, Meta};
use docqa_core::{Error, Result};

use crate::index::{IndexEntry, VectorIndex, METRIC};
use crate::schema::{
	CHUNKS_TABLE_PREFIX, COL_CHUNK_ID, COL_CHUNK_INDEX, COL_CONTENT, COL_DOC_ID, COL_DOC_PATH, COL_ENTRY_ID, COL_METADATA,
	COL_TOTAL_CHUNKS, COL_VECTOR, META_TABLE,
};
use crate::table::{get_meta, open_db, table_exists};
use crate::writer::{meta_key, ACTIVE_INDEX_KEY};

/// Load the index the `active_index` pointer names.
///
/// NotFound when nothing was ever persisted under `location`.
pub async fn load_index(location: &Path) -> Result<VectorIndex> {
	if !location.is_dir() {
		return Err(Error::NotFound(format!("no vector index at {}", location.display())));
	}
	let db = open_db(location).await?;
	if !table_exists(&db, META_TABLE).await? {
		return Err(Error::NotFound(format!("no vector index at {}", location.display())));
	}
	let table = get_meta(&db, META_TABLE, ACTIVE_INDEX_KEY)
		.await?
		.ok_or_else(|| Error::NotFound(format!("no active vector index at {}", location.display())))?;
	if !table_exists(&db, &table).await? {
		return Err(Error::ExternalService(format!("active index table '{table}' is missing")));
	}
	let embedder_id = get_meta(&db, META_TABLE, &meta_key(&table, "embedder_id")).await?.unwrap_or_default();
	if let Some(metric) = get_meta(&db, META_TABLE, &meta_key(&table, "metric")).await? {
		if metric != METRIC {
			warn!(table = %table, metric = %metric, "index was written with a different metric");
		}
	}

	let t = db.open_table(&table).execute().await.map_err(Error::external)?;
	let mut stream = t.query().execute().await.map_err(Error::external)?;
	let mut entries = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::external)? {
		decode_batch(&batch, &mut entries)?;
	}
	let build_id = table.strip_prefix(CHUNKS_TABLE_PREFIX).unwrap_or(&table).to_string();
	debug!(table = %table, entries = entries.len(), "loaded vector index");
	VectorIndex::from_entries(entries, &embedder_id, build_id).map_err(|e| match e {
		Error::InvalidInput(msg) => Error::ExternalService(format!("corrupt index table '{table}': {msg}")),
		other => other,
	})
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::ExternalService(format!("index column '{name}' missing or mistyped")))
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<IndexEntry>) -> Result<()> {
	let ids = column::<UInt32Array>(batch, COL_ENTRY_ID)?;
	let chunk_ids = column::<StringArray>(batch, COL_CHUNK_ID)?;
	let doc_ids = column::<StringArray>(batch, COL_DOC_ID)?;
	let doc_paths = column::<StringArray>(batch, COL_DOC_PATH)?;
	let contents = column::<StringArray>(batch, COL_CONTENT)?;
	let chunk_indices = column::<Int32Array>(batch, COL_CHUNK_INDEX)?;
	let totals = column::<Int32Array>(batch, COL_TOTAL_CHUNKS)?;
	let metadata = column::<StringArray>(batch, COL_METADATA)?;
	let vectors = column::<FixedSizeListArray>(batch, COL_VECTOR)?;

	for i in 0..batch.num_rows() {
		if !vectors.is_valid(i) {
			return Err(Error::ExternalService(format!("entry {} has no vector", ids.value(i))));
		}
		let inner = vectors.value(i);
		let values = inner
			.as_primitive_opt::<arrow_array::types::Float32Type>()
			.ok_or_else(|| Error::ExternalService("vector column is not f32".into()))?;
		let meta: Meta = serde_json::from_str(metadata.value(i)).map_err(Error::external)?;
		out.push(IndexEntry {
			id: ids.value(i),
			vector: values.values().to_vec(),
			chunk: DocumentChunk {
				id: chunk_ids.value(i).to_string(),
				doc_id: doc_ids.value(i).to_string(),
				doc_path: doc_paths.value(i).to_string(),
				content: contents.value(i).to_string(),
				chunk_index: chunk_indices.value(i).max(0) as usize,
				total_chunks: totals.value(i).max(0) as usize,
				metadata: meta,
			},
		});
	}
	Ok(())
}
