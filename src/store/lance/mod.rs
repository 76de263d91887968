#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info};

use super::{Collection, Metadata, QueryResult, Record};
use crate::{RagError, Result};

/// Persistent collection backed by one LanceDB table.
///
/// The table is created on the first upsert, once the vector dimension is
/// known. Later writes and queries must use the same dimension.
pub struct LanceCollection {
    connection: Connection,
    table_name: String,
    table: Option<Table>,
    vector_dimension: Option<usize>,
}

fn store_error(action: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Store(format!("Failed to {}: {}", action, e))
}

impl LanceCollection {
    /// Open (or prepare) the table `table_name` in the database at `db_path`
    #[inline]
    pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {}", db_path.display());

        std::fs::create_dir_all(db_path)
            .map_err(|e| store_error("create vector database directory", e))?;

        let uri = db_path.to_string_lossy();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| store_error("connect to LanceDB", e))?;

        let mut collection = Self {
            connection,
            table_name: table_name.to_string(),
            table: None,
            vector_dimension: None,
        };

        let table_names = collection
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("list tables", e))?;

        if table_names.contains(&collection.table_name) {
            let table = collection
                .connection
                .open_table(&collection.table_name)
                .execute()
                .await
                .map_err(|e| store_error("open existing table", e))?;
            let dimension = detect_vector_dimension(&table).await?;
            info!(
                "Opened table {} with vector dimension {}",
                collection.table_name, dimension
            );
            collection.vector_dimension = Some(dimension);
            collection.table = Some(table);
        } else {
            debug!(
                "Table {} does not exist yet, it will be created on first insert",
                collection.table_name
            );
        }

        Ok(collection)
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn table_for_dimension(&mut self, vector_dim: usize) -> Result<Table> {
        if let Some(existing) = self.vector_dimension {
            if existing != vector_dim {
                return Err(RagError::Store(format!(
                    "Vector dimension mismatch: table {} has {}, got {}",
                    self.table_name, existing, vector_dim
                )));
            }
        }

        if let Some(table) = &self.table {
            return Ok(table.clone());
        }

        info!(
            "Creating table {} with vector dimension {}",
            self.table_name, vector_dim
        );
        let table = self
            .connection
            .create_empty_table(&self.table_name, create_schema(vector_dim)?)
            .execute()
            .await
            .map_err(|e| store_error("create table", e))?;

        self.vector_dimension = Some(vector_dim);
        self.table = Some(table.clone());
        Ok(table)
    }
}

/// Schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    let list_size = i32::try_from(vector_dim)
        .map_err(|_| RagError::Store(format!("Vector dimension too large: {}", vector_dim)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                list_size,
            ),
            false,
        ),
        Field::new("document", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
    ])))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| store_error("get table schema", e))?;

    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return usize::try_from(*size)
                    .map_err(|_| RagError::Store(format!("Invalid vector dimension: {}", size)));
            }
        }
    }

    Err(RagError::Store(
        "Could not find vector column or determine dimension".to_string(),
    ))
}

fn create_record_batch(records: &[Record], vector_dim: usize) -> Result<RecordBatch> {
    let schema = create_schema(vector_dim)?;

    let mut ids = Vec::with_capacity(records.len());
    let mut documents = Vec::with_capacity(records.len());
    let mut metadatas = Vec::with_capacity(records.len());
    let mut flat_values = Vec::with_capacity(records.len() * vector_dim);

    for record in records {
        if record.vector.len() != vector_dim {
            return Err(RagError::Store(format!(
                "Vector dimension mismatch for {}: expected {}, got {}",
                record.id,
                vector_dim,
                record.vector.len()
            )));
        }
        ids.push(record.id.as_str());
        documents.push(record.document.as_str());
        metadatas.push(
            serde_json::to_string(&record.metadata)
                .map_err(|e| store_error("serialize metadata", e))?,
        );
        flat_values.extend_from_slice(&record.vector);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        i32::try_from(vector_dim).map_err(|e| store_error("size vector array", e))?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| store_error("create vector array", e))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(documents)),
        Arc::new(StringArray::from(metadatas)),
    ];

    RecordBatch::try_new(schema, arrays).map_err(|e| store_error("create record batch", e))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch, result: &mut QueryResult) -> Result<()> {
    let documents = string_column(batch, "document")?;
    let metadatas = string_column(batch, "metadata")?;

    for row in 0..batch.num_rows() {
        let metadata: Metadata = serde_json::from_str(metadatas.value(row))
            .map_err(|e| store_error("parse stored metadata", e))?;
        result.documents.push(documents.value(row).to_string());
        result.metadatas.push(metadata);
    }
    Ok(())
}

/// Single-quoted SQL string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl Collection for LanceCollection {
    async fn upsert(&mut self, records: Vec<Record>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let vector_dim = first.vector.len();
        let table = self.table_for_dimension(vector_dim).await?;

        let record_batch = create_record_batch(&records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        let _ = merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| store_error("upsert documents", e))?;

        debug!("Upserted {} documents into {}", records.len(), self.table_name);
        Ok(())
    }

    async fn nearest(&self, vector: &[f32], limit: usize) -> Result<QueryResult> {
        let Some(table) = &self.table else {
            return Ok(QueryResult::default());
        };
        if let Some(dimension) = self.vector_dimension {
            if dimension != vector.len() {
                return Err(RagError::Store(format!(
                    "Query dimension mismatch: table {} has {}, got {}",
                    self.table_name,
                    dimension,
                    vector.len()
                )));
            }
        }

        let mut results = table
            .vector_search(vector)
            .map_err(|e| store_error("create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| store_error("execute search", e))?;

        let mut result = QueryResult::default();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| store_error("read result stream", e))?
        {
            parse_search_batch(&batch, &mut result)?;
        }

        debug!("Parsed {} search results", result.documents.len());
        Ok(result)
    }

    async fn remove(&mut self, ids: &[String]) -> Result<()> {
        let Some(table) = &self.table else {
            return Ok(());
        };
        if ids.is_empty() {
            return Ok(());
        }

        let quoted: Vec<String> = ids.iter().map(|id| quote(id)).collect();
        let predicate = format!("id IN ({})", quoted.join(", "));
        let _ = table
            .delete(&predicate)
            .await
            .map_err(|e| store_error("delete documents", e))?;

        debug!("Deleted up to {} documents from {}", ids.len(), self.table_name);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = &self.table else {
            return Ok(0);
        };
        table
            .count_rows(None)
            .await
            .map_err(|e| store_error("count rows", e))
    }

    async fn close(&mut self) -> Result<()> {
        self.table = None;
        debug!("Released LanceDB table {}", self.table_name);
        Ok(())
    }
}
