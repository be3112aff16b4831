use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const META_TABLE: &str = "meta";
pub const CHUNKS_TABLE_PREFIX: &str = "chunks_";

pub const COL_ENTRY_ID: &str = "entry_id";
pub const COL_CHUNK_ID: &str = "chunk_id";
pub const COL_DOC_ID: &str = "doc_id";
pub const COL_DOC_PATH: &str = "doc_path";
pub const COL_CONTENT: &str = "content";
pub const COL_CHUNK_INDEX: &str = "chunk_index";
pub const COL_TOTAL_CHUNKS: &str = "total_chunks";
pub const COL_METADATA: &str = "metadata";
pub const COL_VECTOR: &str = "vector";

/// One row per index entry; `metadata` is the chunk metadata as a JSON object.
pub fn chunks_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ENTRY_ID, DataType::UInt32, false),
		Field::new(COL_CHUNK_ID, DataType::Utf8, false),
		Field::new(COL_DOC_ID, DataType::Utf8, false),
		Field::new(COL_DOC_PATH, DataType::Utf8, false),
		Field::new(COL_CONTENT, DataType::Utf8, false),
		Field::new(COL_CHUNK_INDEX, DataType::Int32, false),
		Field::new(COL_TOTAL_CHUNKS, DataType::Int32, false),
		Field::new(COL_METADATA, DataType::Utf8, false),
		Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Key/value table holding index descriptors and the active index pointer.
pub fn meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
