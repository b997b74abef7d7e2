//! LanceDB-backed index. Rows live in a `vectors` table under
//! `<dir>/vectors.lance` with columns `row: Int64` and
//! `vector: FixedSizeList<Float32>`; search uses cosine distance.

use anyhow::{anyhow, bail, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use docrag_core::traits::VectorIndexer;
use docrag_core::types::Neighbor;

use crate::store::PersistentIndex;

pub const LANCE_DIR: &str = "vectors.lance";
const TABLE_NAME: &str = "vectors";

pub struct LanceIndex {
    path: PathBuf,
    runtime: Runtime,
    conn: Connection,
    table: Option<Table>,
    dim: Option<usize>,
    len: usize,
}

fn build_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("row", DataType::Int64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
    ]))
}

fn runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join(LANCE_DIR)
}

impl LanceIndex {
    /// Start an empty index under `dir`. Rows are written as they are added,
    /// so `dir` should be a staging directory (see `StoreBuilder::build_and_save`).
    pub fn create(dir: &Path) -> Result<Self> {
        let path = db_path(dir);
        if path.exists() {
            bail!("a LanceDB index already exists at {}", path.display());
        }
        std::fs::create_dir_all(&path)?;
        let runtime = runtime()?;
        let conn = runtime.block_on(connect(path.to_string_lossy().as_ref()).execute())?;
        Ok(Self { path, runtime, conn, table: None, dim: None, len: 0 })
    }

    fn to_record_batch(&self, start_row: usize, dim: usize, vectors: &[Vec<f32>]) -> Result<RecordBatch> {
        let rows: Vec<i64> = (start_row..start_row + vectors.len()).map(|r| r as i64).collect();
        let values = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
        let record_batch = RecordBatch::try_new(
            build_schema(dim),
            vec![
                Arc::new(Int64Array::from(rows)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, dim as i32)),
            ],
        )?;
        Ok(record_batch)
    }
}

impl VectorIndexer for LanceIndex {
    fn dim(&self) -> Option<usize> { self.dim }

    fn len(&self) -> usize { self.len }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else { return Ok(()) };
        let dim = self.dim.unwrap_or(first.len());
        if dim == 0 {
            bail!("cannot add zero-length vectors");
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            bail!("vector of length {} added to index of dimension {}", bad.len(), dim);
        }
        let batch = self.to_record_batch(self.len, dim, vectors)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        match &self.table {
            Some(table) => {
                self.runtime.block_on(table.add(reader).execute())?;
            }
            None => {
                let table = self.runtime.block_on(self.conn.create_table(TABLE_NAME, reader).execute())?;
                self.table = Some(table);
            }
        }
        self.dim = Some(dim);
        self.len += vectors.len();
        debug!("LanceDB table now holds {} rows", self.len);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(table) = &self.table else { return Ok(vec![]) };
        if k == 0 {
            return Ok(vec![]);
        }
        let batches: Vec<RecordBatch> = self.runtime.block_on(async {
            let stream = table
                .vector_search(query.to_vec())?
                .distance_type(DistanceType::Cosine)
                .limit(k)
                .execute()
                .await?;
            stream.try_collect::<Vec<_>>().await
        })?;

        let mut neighbors = Vec::with_capacity(k);
        for batch in batches {
            let rows = batch
                .column_by_name("row")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow!("row column missing from search results"))?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("_distance column missing from search results"))?;
            for i in 0..batch.num_rows() {
                if rows.is_null(i) {
                    continue;
                }
                neighbors.push(Neighbor { row: rows.value(i), score: 1.0 - distances.value(i) });
            }
        }
        Ok(neighbors)
    }
}

impl PersistentIndex for LanceIndex {
    // rows are durable once `add` returns; they cannot be copied elsewhere
    fn save(&self, dir: &Path) -> Result<()> {
        if db_path(dir) != self.path {
            bail!("LanceDB index at {} cannot be saved to {}", self.path.display(), dir.display());
        }
        Ok(())
    }

    fn open(dir: &Path) -> Result<Option<Self>> {
        let path = db_path(dir);
        if !path.is_dir() {
            return Ok(None);
        }
        let runtime = runtime()?;
        let conn = runtime.block_on(connect(path.to_string_lossy().as_ref()).execute())?;
        let names = runtime.block_on(conn.table_names().execute())?;
        if !names.iter().any(|n| n == TABLE_NAME) {
            return Ok(Some(Self { path, runtime, conn, table: None, dim: None, len: 0 }));
        }
        let table = runtime.block_on(conn.open_table(TABLE_NAME).execute())?;
        let len = runtime.block_on(table.count_rows(None))?;
        let schema = runtime.block_on(table.schema())?;
        let dim = match schema.field_with_name("vector")?.data_type() {
            DataType::FixedSizeList(_, n) => Some(*n as usize),
            other => bail!("unexpected vector column type {:?}", other),
        };
        info!("Opened LanceDB index at {} ({} rows)", path.display(), len);
        Ok(Some(Self { path, runtime, conn, table: Some(table), dim, len }))
    }
}
