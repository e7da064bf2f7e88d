//! Vector index over chunk embeddings, backed by LanceDB. Generalizes the
//! teacher's single fixed-schema `MemoryManager` research-log table into one
//! table per open store, keyed by chunk id (SPEC_FULL §A).

use arrow_array::{Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use std::sync::Arc;

const TABLE_NAME: &str = "chunk_vectors";

pub struct VectorIndex {
    connection: lancedb::Connection,
    dimension: u32,
}

impl VectorIndex {
    pub async fn open(uri: &str, dimension: u32) -> anyhow::Result<Self> {
        let connection = lancedb::connect(uri).execute().await?;
        let index = Self {
            connection,
            dimension,
        };
        index.ensure_table().await?;
        Ok(index)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("page_id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    async fn ensure_table(&self) -> anyhow::Result<()> {
        let names = self.connection.table_names().execute().await?;
        if names.iter().any(|n| n == TABLE_NAME) {
            return Ok(());
        }
        let schema = self.schema();
        let empty_batches: Vec<Result<RecordBatch, arrow_schema::ArrowError>> = vec![];
        let reader = RecordBatchIterator::new(empty_batches, schema.clone());
        self.connection
            .create_table(TABLE_NAME, Box::new(reader))
            .execute()
            .await?;
        Ok(())
    }

    async fn table(&self) -> anyhow::Result<lancedb::Table> {
        Ok(self.connection.open_table(TABLE_NAME).execute().await?)
    }

    pub async fn upsert(&self, chunk_id: &str, page_id: &str, vector: &[f32]) -> anyhow::Result<()> {
        self.delete_by_chunk(chunk_id).await?;

        let table = self.table().await?;
        let schema = self.schema();

        let flat: Arc<Float32Array> = Arc::new(Float32Array::from(vector.to_vec()));
        let fixed_list = arrow_array::FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            flat,
            None,
        )?;

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![chunk_id])),
                Arc::new(StringArray::from(vec![page_id])),
                Arc::new(fixed_list),
            ],
        )?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await?;
        Ok(())
    }

    pub async fn delete_by_chunk(&self, chunk_id: &str) -> anyhow::Result<()> {
        let table = self.table().await?;
        let escaped = chunk_id.replace('\'', "''");
        table.delete(&format!("chunk_id = '{escaped}'")).await?;
        Ok(())
    }

    pub async fn delete_by_page(&self, page_id: &str) -> anyhow::Result<()> {
        let table = self.table().await?;
        let escaped = page_id.replace('\'', "''");
        table.delete(&format!("page_id = '{escaped}'")).await?;
        Ok(())
    }

    /// Top-`k` nearest neighbours by vector distance. Returns `(chunk_id,
    /// distance)` pairs in ascending distance order.
    pub async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(String, f32)>> {
        let table = self.table().await?;
        let mut stream = table
            .query()
            .nearest_to(query)?
            .limit(k)
            .execute()
            .await?;

        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let chunk_ids = batch
                .column_by_name("chunk_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .cloned();
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .cloned();

            if let (Some(ids), Some(dists)) = (chunk_ids, distances) {
                for i in 0..ids.len() {
                    out.push((ids.value(i).to_string(), dists.value(i)));
                }
            }
        }
        Ok(out)
    }
}
