//! docrag-vector
//!
//! Embedding-backed vector store: batch building, persistence and top-k
//! retrieval by inner product over unit vectors. The flat index is the
//! default backend; LanceDB is available behind the `lance` feature.

pub mod build;
pub mod flat;
#[cfg(feature = "lance")]
pub mod lance;
pub mod retriever;
pub mod store;

pub use build::{StoreBuilder, DEFAULT_BATCH_SIZE};
pub use flat::FlatIndex;
#[cfg(feature = "lance")]
pub use lance::LanceIndex;
pub use retriever::Retriever;
pub use store::{normalize_l2, PersistentIndex, VectorStore};
