#[cfg(test)]
mod tests;

use super::schema::{
    CONTENT_FIELD, CollectionSchema, FieldKind, ID_COLUMN, INSERTED_AT_COLUMN, NumericType,
    PROJECT_FIELD, SchemaManager, USER_FIELD, VectorAttrs,
};
use super::{DEFAULT_PROJECT, Document, NewDocument, ScoredDocument, TagFilter};
use crate::VaultError;
use crate::embeddings::EmbeddingProvider;
use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Float64Array, Int64Array,
    RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// CRUD and similarity search over one collection
pub struct VectorStore {
    table: Table,
    schema: CollectionSchema,
    vector_field: String,
    vector_attrs: VectorAttrs,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorStore {
    /// Provision `schema` and bind it to `embedder`.
    ///
    /// The provider must produce exactly the schema's dimensionality; this is
    /// checked before provisioning so a misconfigured model never reaches
    /// storage.
    #[inline]
    pub async fn open(
        manager: &SchemaManager,
        schema: CollectionSchema,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, VaultError> {
        schema.validate()?;
        let (vector_field, vector_attrs) = schema
            .vector_field()
            .map(|(name, attrs)| (name.to_string(), attrs))
            .ok_or_else(|| VaultError::Configuration("schema has no vector field".to_string()))?;

        if embedder.dimension() != vector_attrs.dimension {
            return Err(VaultError::Configuration(format!(
                "collection '{}' expects {}-dimensional embeddings but model '{}' produces {}",
                schema.name,
                vector_attrs.dimension,
                embedder.model_id(),
                embedder.dimension()
            )));
        }

        let table = manager.provision(&schema).await?;

        info!(
            "Vector store for '{}' ready ({} {} dims, {:?})",
            schema.name, vector_attrs.dimension, vector_attrs.numeric_type, vector_attrs.distance_metric
        );

        Ok(Self {
            table,
            schema,
            vector_field,
            vector_attrs,
            embedder,
        })
    }

    #[inline]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed and store `content` for `user` in `project`
    #[inline]
    pub async fn add(&self, user: &str, project: &str, content: &str) -> Result<Document, VaultError> {
        self.add_document(NewDocument::new(user, project, content))
            .await
    }

    /// Embed and store one document under a fresh key.
    ///
    /// Identical content saved twice yields two documents.
    #[inline]
    pub async fn add_document(&self, document: NewDocument) -> Result<Document, VaultError> {
        let mut stored = self.add_batch(vec![document]).await?;
        stored
            .pop()
            .ok_or_else(|| VaultError::StorageUnavailable("write returned no document".to_string()))
    }

    /// Embed every document, then append them in a single write
    #[inline]
    pub async fn add_batch(&self, documents: Vec<NewDocument>) -> Result<Vec<Document>, VaultError> {
        if documents.is_empty() {
            debug!("No documents to store");
            return Ok(Vec::new());
        }

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&contents).await?;
        if vectors.len() != documents.len() {
            return Err(VaultError::EmbeddingUnavailable(format!(
                "requested {} embeddings, received {}",
                documents.len(),
                vectors.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let base = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let stored: Vec<Document> = documents
            .into_iter()
            .enumerate()
            .map(|(offset, doc)| Document {
                id: format!("{}:{}", self.schema.prefix, Uuid::new_v4()),
                user: doc.user,
                project: if self.schema.is_project_scoped() {
                    doc.project
                } else {
                    DEFAULT_PROJECT.to_string()
                },
                content: doc.content,
                attributes: doc.attributes,
                inserted_at: base + offset as i64,
            })
            .collect();

        let record_batch = self.create_record_batch(&stored, &vectors)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table.add(reader).execute().await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to insert documents: {}", e))
        })?;

        debug!(
            "Stored {} documents in '{}'",
            stored.len(),
            self.schema.name
        );
        Ok(stored)
    }

    /// Nearest documents to `text` belonging to `user` (and `project` for
    /// project-scoped collections), closest first, at most `limit` of them.
    ///
    /// Fewer matches than `limit`, including none, is not an error.
    #[inline]
    pub async fn query(
        &self,
        user: &str,
        project: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, VaultError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text).await?;
        self.check_dimension(&query_vector)?;

        let filter = self.scope_filter(user, project);
        debug!(
            "Searching '{}' with limit {} where {:?}",
            self.schema.name,
            limit,
            filter.to_sql()
        );

        let mut query = self
            .table
            .vector_search(query_vector.as_slice())
            .map_err(|e| {
                VaultError::StorageUnavailable(format!("Failed to create vector search: {}", e))
            })?
            .column(&self.vector_field)
            .distance_type(self.vector_attrs.distance_metric.to_distance_type())
            .select(Select::Columns(self.stored_columns()))
            .limit(limit);

        if let Some(predicate) = filter.to_sql() {
            query = query.only_if(predicate);
        }

        let results = query.execute().await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to execute search: {}", e))
        })?;

        let mut hits = self.parse_stream(results).await?;
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.document.inserted_at.cmp(&b.document.inserted_at))
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(limit);

        debug!("Found {} documents in '{}'", hits.len(), self.schema.name);
        Ok(hits)
    }

    /// Fetch a document by key
    #[inline]
    pub async fn get(&self, id: &str) -> Result<Option<Document>, VaultError> {
        let results = self
            .table
            .query()
            .only_if(TagFilter::new().eq(ID_COLUMN, id).to_sql().unwrap_or_default())
            .select(Select::Columns(self.stored_columns()))
            .limit(1)
            .execute()
            .await
            .map_err(|e| VaultError::StorageUnavailable(format!("Failed to look up document: {}", e)))?;

        Ok(self
            .parse_stream(results)
            .await?
            .pop()
            .map(|hit| hit.document))
    }

    /// Every document matching `filter`, oldest first
    #[inline]
    pub async fn list(&self, filter: &TagFilter) -> Result<Vec<Document>, VaultError> {
        let mut query = self
            .table
            .query()
            .select(Select::Columns(self.stored_columns()));
        if let Some(predicate) = filter.to_sql() {
            query = query.only_if(predicate);
        }

        let results = query.execute().await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to list documents: {}", e))
        })?;

        let mut documents: Vec<Document> = self
            .parse_stream(results)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect();
        documents.sort_by(|a, b| {
            a.inserted_at
                .cmp(&b.inserted_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!("Listed {} documents in '{}'", documents.len(), self.schema.name);
        Ok(documents)
    }

    /// Remove a document by key, reporting whether it existed
    #[inline]
    pub async fn delete(&self, id: &str) -> Result<bool, VaultError> {
        let filter = TagFilter::new().eq(ID_COLUMN, id);
        if self.count(&filter).await? == 0 {
            return Ok(false);
        }

        let predicate = filter.to_sql().unwrap_or_default();
        self.table.delete(&predicate).await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to delete document: {}", e))
        })?;

        info!("Deleted document {} from '{}'", id, self.schema.name);
        Ok(true)
    }

    /// Number of documents matching `filter`
    #[inline]
    pub async fn count(&self, filter: &TagFilter) -> Result<u64, VaultError> {
        let count = self
            .table
            .count_rows(filter.to_sql())
            .await
            .map_err(|e| VaultError::StorageUnavailable(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Filter restricting a query to one user's partition
    #[inline]
    pub fn scope_filter(&self, user: &str, project: &str) -> TagFilter {
        let filter = TagFilter::new().eq(USER_FIELD, user);
        if self.schema.is_project_scoped() {
            filter.eq(PROJECT_FIELD, project)
        } else {
            filter
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VaultError> {
        if vector.len() != self.vector_attrs.dimension {
            return Err(VaultError::EmbeddingUnavailable(format!(
                "model '{}' returned {} dimensions, collection '{}' stores {}",
                self.embedder.model_id(),
                vector.len(),
                self.schema.name,
                self.vector_attrs.dimension
            )));
        }
        Ok(())
    }

    /// Every column except the embedding
    fn stored_columns(&self) -> Vec<String> {
        let mut columns = vec![ID_COLUMN.to_string(), INSERTED_AT_COLUMN.to_string()];
        columns.extend(
            self.schema
                .fields
                .iter()
                .filter(|f| !matches!(f.kind, FieldKind::Vector(_)))
                .map(|f| f.name.clone()),
        );
        columns
    }

    /// Create a RecordBatch laid out exactly as the collection schema
    fn create_record_batch(
        &self,
        documents: &[Document],
        vectors: &[Vec<f32>],
    ) -> Result<RecordBatch, VaultError> {
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                documents.iter().map(|d| d.id.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                documents.iter().map(|d| d.inserted_at),
            )),
        ];

        for field in &self.schema.fields {
            let array: ArrayRef = match &field.kind {
                FieldKind::Tag => Arc::new(StringArray::from_iter_values(
                    documents.iter().map(|d| column_value(d, &field.name)),
                )),
                FieldKind::Text => Arc::new(StringArray::from(
                    documents
                        .iter()
                        .map(|d| optional_column_value(d, &field.name))
                        .collect::<Vec<_>>(),
                )),
                FieldKind::Vector(attrs) => self.create_vector_array(vectors, *attrs)?,
            };
            arrays.push(array);
        }

        RecordBatch::try_new(self.schema.to_arrow(), arrays).map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to create record batch: {}", e))
        })
    }

    fn create_vector_array(
        &self,
        vectors: &[Vec<f32>],
        attrs: VectorAttrs,
    ) -> Result<ArrayRef, VaultError> {
        let flat = vectors.iter().flatten().copied();
        let values: ArrayRef = match attrs.numeric_type {
            NumericType::Float32 => Arc::new(Float32Array::from_iter_values(flat)),
            NumericType::Float64 => {
                Arc::new(Float64Array::from_iter_values(flat.map(f64::from)))
            }
        };

        let item = Arc::new(Field::new("item", attrs.numeric_type.data_type(), false));
        let array = FixedSizeListArray::try_new(item, attrs.dimension as i32, values, None)
            .map_err(|e| {
                VaultError::StorageUnavailable(format!("Failed to create vector array: {}", e))
            })?;
        Ok(Arc::new(array))
    }

    async fn parse_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ScoredDocument>, VaultError> {
        let mut hits = Vec::new();

        while let Some(batch) = results.try_next().await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to read result stream: {}", e))
        })? {
            hits.extend(self.parse_batch(&batch)?);
        }

        Ok(hits)
    }

    fn parse_batch(&self, batch: &RecordBatch) -> Result<Vec<ScoredDocument>, VaultError> {
        let ids = string_column(batch, ID_COLUMN)?;
        let inserted_at = batch
            .column_by_name(INSERTED_AT_COLUMN)
            .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| {
                VaultError::StorageUnavailable(format!("Missing {} column", INSERTED_AT_COLUMN))
            })?;
        let users = string_column(batch, USER_FIELD)?;
        let contents = string_column(batch, CONTENT_FIELD)?;
        let projects = if self.schema.is_project_scoped() {
            Some(string_column(batch, PROJECT_FIELD)?)
        } else {
            None
        };

        let mut attribute_columns = Vec::new();
        for field in &self.schema.fields {
            let reserved = [USER_FIELD, PROJECT_FIELD, CONTENT_FIELD].contains(&field.name.as_str());
            if reserved || matches!(field.kind, FieldKind::Vector(_)) {
                continue;
            }
            attribute_columns.push((field.name.as_str(), string_column(batch, &field.name)?));
        }

        let distances = batch.column_by_name("_distance");

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let attributes: BTreeMap<String, String> = attribute_columns
                .iter()
                .filter(|(_, column)| !column.is_null(row))
                .map(|(name, column)| ((*name).to_string(), column.value(row).to_string()))
                .collect();

            let document = Document {
                id: ids.value(row).to_string(),
                user: users.value(row).to_string(),
                project: projects.map_or_else(
                    || DEFAULT_PROJECT.to_string(),
                    |p| p.value(row).to_string(),
                ),
                content: if contents.is_null(row) {
                    String::new()
                } else {
                    contents.value(row).to_string()
                },
                attributes,
                inserted_at: inserted_at.value(row),
            };

            hits.push(ScoredDocument {
                document,
                distance: distances.map_or(0.0, |col| distance_at(col.as_ref(), row)),
            });
        }

        Ok(hits)
    }
}

fn column_value<'a>(document: &'a Document, field: &str) -> &'a str {
    match field {
        USER_FIELD => &document.user,
        PROJECT_FIELD => &document.project,
        CONTENT_FIELD => &document.content,
        other => document.attribute(other).unwrap_or_default(),
    }
}

fn optional_column_value<'a>(document: &'a Document, field: &str) -> Option<&'a str> {
    match field {
        USER_FIELD | PROJECT_FIELD | CONTENT_FIELD => Some(column_value(document, field)),
        other => document.attribute(other),
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, VaultError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| VaultError::StorageUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| VaultError::StorageUnavailable(format!("Invalid {} column type", name)))
}

fn distance_at(column: &dyn Array, row: usize) -> f32 {
    if column.is_null(row) {
        return 0.0;
    }
    match column.data_type() {
        DataType::Float32 => column
            .as_any()
            .downcast_ref::<Float32Array>()
            .map_or(0.0, |d| d.value(row)),
        DataType::Float64 => column
            .as_any()
            .downcast_ref::<Float64Array>()
            .map_or(0.0, |d| d.value(row) as f32),
        _ => 0.0,
    }
}
