//! Persistent nearest-neighbour index over embedded chunks.
//!
//! An index is built in memory, persisted as one LanceDB table per build, and
//! published by flipping the `active_index` pointer in the `meta` table.
//! Loading reads the whole active table back and searches it exactly.
pub mod index;
pub mod reader;
pub mod retriever;
pub mod schema;
pub mod table;
pub mod writer;

pub use index::{IndexEntry, SearchHit, VectorIndex, METRIC};
pub use retriever::Retriever;
