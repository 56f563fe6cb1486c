#[cfg(test)]
mod tests;

use arrow::datatypes::{DataType, Field, Schema};
use lancedb::index::Index;
use lancedb::index::scalar::BTreeIndexBuilder;
use lancedb::index::vector::{IvfHnswSqIndexBuilder, IvfPqIndexBuilder};
use lancedb::{Connection, DistanceType, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::VaultError;

/// Primary key column, `"{prefix}:{uuid}"`
pub const ID_COLUMN: &str = "id";
/// Insertion time in nanoseconds, used to order equidistant hits
pub const INSERTED_AT_COLUMN: &str = "inserted_at";
pub const USER_FIELD: &str = "user";
pub const PROJECT_FIELD: &str = "project";
pub const CONTENT_FIELD: &str = "content";
pub const EMBEDDING_FIELD: &str = "embedding";

/// IVF partitions cannot be trained on fewer rows than this
pub const MIN_ROWS_FOR_ANN_INDEX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl DistanceMetric {
    #[inline]
    pub fn to_distance_type(self) -> DistanceType {
        match self {
            Self::Cosine => DistanceType::Cosine,
            Self::L2 => DistanceType::L2,
            Self::Dot => DistanceType::Dot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAlgorithm {
    /// Exhaustive scan, exact results
    #[default]
    Flat,
    IvfPq,
    IvfHnswSq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    #[default]
    Float32,
    Float64,
}

impl NumericType {
    #[inline]
    pub fn data_type(self) -> DataType {
        match self {
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
        }
    }
}

impl std::fmt::Display for NumericType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            NumericType::Float32 => write!(f, "float32"),
            NumericType::Float64 => write!(f, "float64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorAttrs {
    pub dimension: usize,
    pub distance_metric: DistanceMetric,
    pub algorithm: IndexAlgorithm,
    pub numeric_type: NumericType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, stored as-is and never used for filtering
    Text,
    /// Untokenized identifier, matched exactly by tag filters
    Tag,
    Vector(VectorAttrs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSchema {
    #[inline]
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
        }
    }

    #[inline]
    pub fn tag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Tag,
        }
    }

    #[inline]
    pub fn vector(name: &str, attrs: VectorAttrs) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Vector(attrs),
        }
    }

    fn arrow_field(&self) -> Field {
        match &self.kind {
            FieldKind::Tag => Field::new(&self.name, DataType::Utf8, false),
            // Nullable so rows written before a text field existed stay readable
            FieldKind::Text => Field::new(&self.name, DataType::Utf8, true),
            FieldKind::Vector(attrs) => Field::new(
                &self.name,
                vector_data_type(attrs.dimension, attrs.numeric_type),
                false,
            ),
        }
    }
}

/// Arrow type of a vector column with the given layout
#[inline]
pub fn vector_data_type(dimension: usize, numeric_type: NumericType) -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new("item", numeric_type.data_type(), false)),
        dimension as i32,
    )
}

/// Field layout of one logical collection.
///
/// `prefix` names the table that holds the documents, `name` identifies the
/// collection in logs and errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub prefix: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// Schema for a user/project scoped collection: `user` and `project` tags,
    /// a `content` body, any extra text fields, and one embedding vector.
    #[inline]
    pub fn scoped(name: &str, prefix: &str, vector: VectorAttrs, extra_text: &[&str]) -> Self {
        let mut fields = vec![
            FieldSchema::tag(USER_FIELD),
            FieldSchema::tag(PROJECT_FIELD),
            FieldSchema::text(CONTENT_FIELD),
        ];
        fields.extend(extra_text.iter().map(|name| FieldSchema::text(name)));
        fields.push(FieldSchema::vector(EMBEDDING_FIELD, vector));

        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            fields,
        }
    }

    /// Check the declared layout once, before anything touches storage
    #[inline]
    pub fn validate(&self) -> Result<(), VaultError> {
        let invalid = |reason: String| {
            VaultError::Configuration(format!("collection '{}': {}", self.name, reason))
        };

        if self.name.trim().is_empty() {
            return Err(VaultError::Configuration(
                "collection name cannot be empty".to_string(),
            ));
        }
        if self.prefix.trim().is_empty() {
            return Err(invalid("key prefix cannot be empty".to_string()));
        }
        if self.fields.is_empty() {
            return Err(invalid("schema declares no fields".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(invalid("field name cannot be empty".to_string()));
            }
            if field.name == ID_COLUMN || field.name == INSERTED_AT_COLUMN {
                return Err(invalid(format!("field name '{}' is reserved", field.name)));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        let vectors: Vec<&VectorAttrs> = self
            .fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::Vector(attrs) => Some(attrs),
                _ => None,
            })
            .collect();
        match vectors.as_slice() {
            [attrs] if attrs.dimension == 0 => {
                return Err(invalid("vector dimension must be positive".to_string()));
            }
            [_] => {}
            [] => return Err(invalid("exactly one vector field is required".to_string())),
            _ => {
                return Err(invalid(format!(
                    "{} vector fields declared, multi-vector documents are not supported",
                    vectors.len()
                )));
            }
        }

        if !self.has_tag(USER_FIELD) {
            return Err(invalid(format!("a '{}' tag field is required", USER_FIELD)));
        }
        if !self.has_text(CONTENT_FIELD) {
            return Err(invalid(format!("a '{}' text field is required", CONTENT_FIELD)));
        }

        Ok(())
    }

    /// The single vector field. Only meaningful on a validated schema.
    #[inline]
    pub fn vector_field(&self) -> Option<(&str, VectorAttrs)> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::Vector(attrs) => Some((f.name.as_str(), attrs)),
            _ => None,
        })
    }

    #[inline]
    pub fn has_tag(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name == name && f.kind == FieldKind::Tag)
    }

    #[inline]
    pub fn has_text(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name == name && f.kind == FieldKind::Text)
    }

    /// Queries are additionally filtered by project when the schema carries it
    #[inline]
    pub fn is_project_scoped(&self) -> bool {
        self.has_tag(PROJECT_FIELD)
    }

    #[inline]
    pub fn tag_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Tag)
            .map(|f| f.name.as_str())
    }

    /// Arrow schema of the backing table: id, insertion time, then declared fields
    #[inline]
    pub fn to_arrow(&self) -> Arc<Schema> {
        let mut fields = Vec::with_capacity(self.fields.len() + 2);
        fields.push(Field::new(ID_COLUMN, DataType::Utf8, false));
        fields.push(Field::new(INSERTED_AT_COLUMN, DataType::Int64, false));
        fields.extend(self.fields.iter().map(FieldSchema::arrow_field));
        Arc::new(Schema::new(fields))
    }

    /// Describe why `existing` cannot hold documents of this schema, if it can't
    #[inline]
    pub fn incompatibility(&self, existing: &Schema) -> Option<String> {
        let declared = self.to_arrow();

        for field in declared.fields() {
            let Ok(stored) = existing.field_with_name(field.name()) else {
                return Some(format!("stored index has no field '{}'", field.name()));
            };

            match (field.data_type(), stored.data_type()) {
                (
                    DataType::FixedSizeList(want_item, want_dim),
                    DataType::FixedSizeList(have_item, have_dim),
                ) => {
                    if want_dim != have_dim {
                        return Some(format!(
                            "vector field '{}' holds {}-dimensional embeddings, configured {}",
                            field.name(),
                            have_dim,
                            want_dim
                        ));
                    }
                    if want_item.data_type() != have_item.data_type() {
                        return Some(format!(
                            "vector field '{}' stores {:?} values, configured {:?}",
                            field.name(),
                            have_item.data_type(),
                            want_item.data_type()
                        ));
                    }
                }
                (want, have) if want != have => {
                    return Some(format!(
                        "field '{}' has type {:?}, configured {:?}",
                        field.name(),
                        have,
                        want
                    ));
                }
                _ => {}
            }
        }

        existing
            .fields()
            .iter()
            .find(|f| declared.field_with_name(f.name()).is_err())
            .map(|f| format!("stored index has undeclared field '{}'", f.name()))
    }
}

/// Creates and rebuilds the table and indexes behind each collection
#[derive(Clone)]
pub struct SchemaManager {
    connection: Connection,
}

impl SchemaManager {
    #[inline]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    #[inline]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Make `schema` queryable, creating its table when absent.
    ///
    /// An existing table is kept with all of its rows; only the index
    /// structures over it are replaced. Must not run concurrently with queries
    /// against the same collection.
    #[inline]
    pub async fn provision(&self, schema: &CollectionSchema) -> Result<Table, VaultError> {
        schema.validate()?;

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| VaultError::StorageUnavailable(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.contains(&schema.prefix) {
            debug!(
                "Collection '{}' exists under '{}', checking stored layout",
                schema.name, schema.prefix
            );
            let table = self
                .connection
                .open_table(&schema.prefix)
                .execute()
                .await
                .map_err(|e| {
                    VaultError::StorageUnavailable(format!(
                        "Failed to open table '{}': {}",
                        schema.prefix, e
                    ))
                })?;

            let existing = table.schema().await.map_err(|e| {
                VaultError::StorageUnavailable(format!("Failed to read table schema: {}", e))
            })?;

            if let Some(reason) = schema.incompatibility(&existing) {
                warn!(
                    "Refusing to provision collection '{}': {}",
                    schema.name, reason
                );
                return Err(VaultError::SchemaConflict {
                    collection: schema.name.clone(),
                    reason,
                });
            }
            table
        } else {
            info!(
                "Creating table '{}' for collection '{}'",
                schema.prefix, schema.name
            );
            self.connection
                .create_empty_table(&schema.prefix, schema.to_arrow())
                .execute()
                .await
                .map_err(|e| {
                    VaultError::StorageUnavailable(format!(
                        "Failed to create table '{}': {}",
                        schema.prefix, e
                    ))
                })?
        };

        self.rebuild_indexes(&table, schema).await?;

        info!("Collection '{}' provisioned", schema.name);
        Ok(table)
    }

    async fn rebuild_indexes(&self, table: &Table, schema: &CollectionSchema) -> Result<(), VaultError> {
        let rows = table.count_rows(None).await.map_err(|e| {
            VaultError::StorageUnavailable(format!("Failed to count rows: {}", e))
        })?;

        if rows == 0 {
            debug!(
                "Collection '{}' is empty, deferring index build",
                schema.name
            );
            return Ok(());
        }

        for tag in schema.tag_fields() {
            table
                .create_index(&[tag], Index::BTree(BTreeIndexBuilder::default()))
                .replace(true)
                .execute()
                .await
                .map_err(|e| {
                    VaultError::StorageUnavailable(format!(
                        "Failed to build tag index on '{}': {}",
                        tag, e
                    ))
                })?;
        }

        let Some((vector_name, attrs)) = schema.vector_field() else {
            return Ok(());
        };

        let distance_type = attrs.distance_metric.to_distance_type();
        let index = match attrs.algorithm {
            IndexAlgorithm::Flat => None,
            IndexAlgorithm::IvfPq => Some(Index::IvfPq(
                IvfPqIndexBuilder::default().distance_type(distance_type),
            )),
            IndexAlgorithm::IvfHnswSq => Some(Index::IvfHnswSq(
                IvfHnswSqIndexBuilder::default().distance_type(distance_type),
            )),
        };

        match index {
            Some(index) if rows >= MIN_ROWS_FOR_ANN_INDEX => {
                table
                    .create_index(&[vector_name], index)
                    .replace(true)
                    .execute()
                    .await
                    .map_err(|e| {
                        VaultError::StorageUnavailable(format!(
                            "Failed to build vector index on '{}': {}",
                            vector_name, e
                        ))
                    })?;
                debug!(
                    "Built {:?} index over {} rows of '{}'",
                    attrs.algorithm, rows, schema.name
                );
            }
            Some(_) => {
                debug!(
                    "Only {} rows in '{}', searching exhaustively until {} are stored",
                    rows, schema.name, MIN_ROWS_FOR_ANN_INDEX
                );
            }
            None => {}
        }

        Ok(())
    }
}
