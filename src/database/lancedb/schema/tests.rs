use super::*;
use tempfile::TempDir;

fn attrs(dimension: usize) -> VectorAttrs {
    VectorAttrs {
        dimension,
        distance_metric: DistanceMetric::Cosine,
        algorithm: IndexAlgorithm::Flat,
        numeric_type: NumericType::Float32,
    }
}

async fn create_test_manager() -> (SchemaManager, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = temp_dir.path().join("vectors");
    let connection = lancedb::connect(&uri.to_string_lossy())
        .execute()
        .await
        .expect("should connect to lancedb");
    (SchemaManager::new(connection), temp_dir)
}

#[test]
fn scoped_schema_layout() {
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &["title"]);
    assert!(schema.validate().is_ok());
    assert!(schema.is_project_scoped());

    let arrow = schema.to_arrow();
    let names: Vec<&str> = arrow.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(
        names,
        vec![
            "id",
            "inserted_at",
            "user",
            "project",
            "content",
            "title",
            "embedding"
        ]
    );

    let (name, vector) = schema.vector_field().expect("has vector field");
    assert_eq!(name, "embedding");
    assert_eq!(vector.dimension, 8);
}

#[test]
fn rejects_missing_vector_field() {
    let mut schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);
    schema.fields.retain(|f| !matches!(f.kind, FieldKind::Vector(_)));

    let err = schema.validate().expect_err("no vector field must fail");
    assert!(matches!(err, VaultError::Configuration(_)));
}

#[test]
fn rejects_multiple_vector_fields() {
    let mut schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);
    schema.fields.push(FieldSchema::vector("title_embedding", attrs(8)));

    let err = schema.validate().expect_err("two vector fields must fail");
    assert!(err.to_string().contains("multi-vector"));
}

#[test]
fn rejects_zero_dimension() {
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(0), &[]);
    assert!(schema.validate().is_err());
}

#[test]
fn rejects_reserved_and_duplicate_names() {
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &["id"]);
    assert!(schema.validate().is_err());

    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &["content"]);
    assert!(schema.validate().is_err());
}

#[test]
fn rejects_schema_without_user_tag() {
    let schema = CollectionSchema {
        name: "bare".to_string(),
        prefix: "bare".to_string(),
        fields: vec![
            FieldSchema::text(CONTENT_FIELD),
            FieldSchema::vector(EMBEDDING_FIELD, attrs(4)),
        ],
    };
    assert!(schema.validate().is_err());
}

#[test]
fn unscoped_schema_is_not_project_scoped() {
    let schema = CollectionSchema {
        name: "global".to_string(),
        prefix: "global".to_string(),
        fields: vec![
            FieldSchema::tag(USER_FIELD),
            FieldSchema::text(CONTENT_FIELD),
            FieldSchema::vector(EMBEDDING_FIELD, attrs(4)),
        ],
    };
    assert!(schema.validate().is_ok());
    assert!(!schema.is_project_scoped());
}

#[test]
fn incompatibility_reports_dimension_mismatch() {
    let stored = CollectionSchema::scoped("memory", "user_memory", attrs(384), &[]);
    let declared = CollectionSchema::scoped("memory", "user_memory", attrs(768), &[]);

    let reason = declared
        .incompatibility(&stored.to_arrow())
        .expect("dimensions differ");
    assert!(reason.contains("384"));
    assert!(reason.contains("768"));
}

#[test]
fn incompatibility_reports_numeric_type_mismatch() {
    let stored = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);
    let declared = CollectionSchema::scoped(
        "memory",
        "user_memory",
        VectorAttrs {
            numeric_type: NumericType::Float64,
            ..attrs(8)
        },
        &[],
    );

    assert!(declared.incompatibility(&stored.to_arrow()).is_some());
}

#[test]
fn incompatibility_reports_missing_text_field() {
    let stored = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);
    let declared = CollectionSchema::scoped("memory", "user_memory", attrs(8), &["title"]);

    let reason = declared
        .incompatibility(&stored.to_arrow())
        .expect("title is missing");
    assert!(reason.contains("title"));
}

#[test]
fn identical_layout_is_compatible() {
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &["title"]);
    assert_eq!(schema.incompatibility(&schema.to_arrow()), None);
}

#[tokio::test]
async fn provision_creates_missing_table() {
    let (manager, _temp_dir) = create_test_manager().await;
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);

    let table = manager
        .provision(&schema)
        .await
        .expect("should provision collection");
    assert_eq!(table.name(), "user_memory");

    let names = manager
        .connection()
        .table_names()
        .execute()
        .await
        .expect("should list tables");
    assert!(names.contains(&"user_memory".to_string()));
}

#[tokio::test]
async fn provision_twice_is_harmless() {
    let (manager, _temp_dir) = create_test_manager().await;
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);

    manager
        .provision(&schema)
        .await
        .expect("first provision should succeed");
    manager
        .provision(&schema)
        .await
        .expect("second provision should succeed");
}

#[tokio::test]
async fn provision_rejects_dimension_change() {
    let (manager, _temp_dir) = create_test_manager().await;

    let original = CollectionSchema::scoped("memory", "user_memory", attrs(8), &[]);
    manager
        .provision(&original)
        .await
        .expect("should provision original layout");

    let resized = CollectionSchema::scoped("memory", "user_memory", attrs(16), &[]);
    let err = manager
        .provision(&resized)
        .await
        .err()
        .expect("dimension change must conflict");

    match err {
        VaultError::SchemaConflict { collection, reason } => {
            assert_eq!(collection, "memory");
            assert!(reason.contains("16"));
        }
        other => panic!("expected schema conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn provision_validates_before_touching_storage() {
    let (manager, _temp_dir) = create_test_manager().await;
    let schema = CollectionSchema::scoped("memory", "user_memory", attrs(0), &[]);

    assert!(matches!(
        manager.provision(&schema).await,
        Err(VaultError::Configuration(_))
    ));

    let names = manager
        .connection()
        .table_names()
        .execute()
        .await
        .expect("should list tables");
    assert!(names.is_empty());
}
