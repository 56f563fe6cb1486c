use super::*;
use crate::database::lancedb::schema::{DistanceMetric, IndexAlgorithm};
use crate::embeddings::HashingEmbedder;
use tempfile::TempDir;

const TEST_DIMENSION: usize = 256;

fn attrs(numeric_type: NumericType) -> VectorAttrs {
    VectorAttrs {
        dimension: TEST_DIMENSION,
        distance_metric: DistanceMetric::Cosine,
        algorithm: IndexAlgorithm::Flat,
        numeric_type,
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

async fn create_memory_store(manager: &SchemaManager) -> VectorStore {
    let schema = CollectionSchema::scoped(
        "memory",
        "user_memory",
        attrs(NumericType::Float32),
        &["title"],
    );
    VectorStore::open(manager, schema, Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .await
        .expect("should open vector store")
}

#[tokio::test]
async fn add_assigns_prefixed_keys() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let first = store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add document");
    let second = store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add duplicate content");

    assert!(first.id.starts_with("user_memory:"));
    assert_ne!(first.id, second.id, "duplicate content gets its own key");
    assert_eq!(
        store.count(&TagFilter::new()).await.expect("should count"),
        2
    );
}

#[tokio::test]
async fn query_returns_closest_first() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add("jane", "default", "drives a red car")
        .await
        .expect("should add document");
    store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add document");

    let hits = store
        .query("jane", "default", "likes tea", 3)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document.content, "likes tea");
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[0].distance.abs() < 1e-4, "identical text has zero distance");
}

#[tokio::test]
async fn query_never_crosses_users() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add document");
    store
        .add("bob", "default", "likes tea")
        .await
        .expect("should add document");
    store
        .add("bob", "default", "likes coffee")
        .await
        .expect("should add document");

    let hits = store
        .query("jane", "default", "likes tea", 3)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|hit| hit.document.user == "jane"));
}

#[tokio::test]
async fn query_never_crosses_projects() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add("jane", "alpha", "deploys on fridays")
        .await
        .expect("should add document");
    store
        .add("jane", "beta", "deploys on mondays")
        .await
        .expect("should add document");

    let hits = store
        .query("jane", "alpha", "deploys", 3)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.project, "alpha");
    assert_eq!(hits[0].document.content, "deploys on fridays");
}

#[tokio::test]
async fn user_wide_collection_ignores_project() {
    let (manager, _temp_dir) = create_test_manager().await;
    let mut schema =
        CollectionSchema::scoped("profile", "user_profile", attrs(NumericType::Float32), &[]);
    schema.fields.retain(|f| f.name != PROJECT_FIELD);
    let store = VectorStore::open(
        &manager,
        schema,
        Arc::new(HashingEmbedder::new(TEST_DIMENSION)),
    )
    .await
    .expect("should open vector store");

    store
        .add("jane", "alpha", "prefers dark mode")
        .await
        .expect("should add document");

    let hits = store
        .query("jane", "beta", "dark mode", 3)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.project, DEFAULT_PROJECT);
}

#[tokio::test]
async fn query_honours_limit() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let documents = (0..6)
        .map(|i| NewDocument::new("jane", "default", &format!("note number {}", i)))
        .collect();
    store
        .add_batch(documents)
        .await
        .expect("should add batch");

    let hits = store
        .query("jane", "default", "note", 3)
        .await
        .expect("should search");
    assert_eq!(hits.len(), 3);

    let none = store
        .query("jane", "default", "note", 0)
        .await
        .expect("zero limit is not an error");
    assert!(none.is_empty());
}

#[tokio::test]
async fn query_on_empty_collection_is_empty() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let hits = store
        .query("newuser", "default", "anything at all", 3)
        .await
        .expect("empty collection is not an error");

    assert!(hits.is_empty());
}

#[tokio::test]
async fn equidistant_hits_keep_insertion_order() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let stored = store
        .add_batch(vec![
            NewDocument::new("jane", "default", "same words"),
            NewDocument::new("jane", "default", "same words"),
            NewDocument::new("jane", "default", "same words"),
        ])
        .await
        .expect("should add batch");

    let hits = store
        .query("jane", "default", "same words", 3)
        .await
        .expect("should search");

    let expected: Vec<&str> = stored.iter().map(|d| d.id.as_str()).collect();
    let actual: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn attributes_are_persisted() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let stored = store
        .add_document(
            NewDocument::new("jane", "default", "likes tea").with_attribute("title", "Drinks"),
        )
        .await
        .expect("should add document");

    let fetched = store
        .get(&stored.id)
        .await
        .expect("should look up document")
        .expect("document should exist");

    assert_eq!(fetched, stored);
    assert_eq!(fetched.attribute("title"), Some("Drinks"));
}

#[tokio::test]
async fn missing_attribute_reads_back_as_absent() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let stored = store
        .add("jane", "default", "untitled thought")
        .await
        .expect("should add document");

    let fetched = store
        .get(&stored.id)
        .await
        .expect("should look up document")
        .expect("document should exist");

    assert_eq!(fetched.attribute("title"), None);
}

#[tokio::test]
async fn get_and_delete() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let stored = store
        .add("jane", "default", "temporary note")
        .await
        .expect("should add document");

    assert!(store.delete(&stored.id).await.expect("should delete"));
    assert!(
        store
            .get(&stored.id)
            .await
            .expect("should look up document")
            .is_none()
    );
    assert!(
        !store
            .delete(&stored.id)
            .await
            .expect("deleting twice is not an error")
    );
}

#[tokio::test]
async fn count_by_partition() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add_batch(vec![
            NewDocument::new("jane", "alpha", "one"),
            NewDocument::new("jane", "beta", "two"),
            NewDocument::new("bob", "alpha", "three"),
        ])
        .await
        .expect("should add batch");

    let jane = store
        .count(&store.scope_filter("jane", "alpha"))
        .await
        .expect("should count");
    let everyone = store.count(&TagFilter::new()).await.expect("should count");

    assert_eq!(jane, 1);
    assert_eq!(everyone, 3);
}

#[tokio::test]
async fn list_stays_within_partition() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add_batch(vec![
            NewDocument::new("jane", "alpha", "first"),
            NewDocument::new("jane", "beta", "elsewhere"),
            NewDocument::new("bob", "alpha", "not jane"),
            NewDocument::new("jane", "alpha", "second"),
        ])
        .await
        .expect("should add batch");

    let listed = store
        .list(&store.scope_filter("jane", "alpha"))
        .await
        .expect("should list");

    let contents: Vec<&str> = listed.iter().map(|d| d.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert!(listed.iter().all(|d| d.user == "jane" && d.project == "alpha"));

    let everyone = store.list(&TagFilter::new()).await.expect("should list");
    assert_eq!(everyone.len(), 4);
}

#[tokio::test]
async fn list_of_empty_partition_is_empty() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    let listed = store
        .list(&store.scope_filter("nobody", "alpha"))
        .await
        .expect("should list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn reprovisioning_keeps_documents() {
    let (manager, _temp_dir) = create_test_manager().await;
    let store = create_memory_store(&manager).await;

    store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add document");
    drop(store);

    let reopened = create_memory_store(&manager).await;
    assert_eq!(
        reopened
            .count(&TagFilter::new())
            .await
            .expect("should count"),
        1
    );

    let hits = reopened
        .query("jane", "default", "likes tea", 3)
        .await
        .expect("should search");
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn float64_collection_round_trip() {
    let (manager, _temp_dir) = create_test_manager().await;
    let schema =
        CollectionSchema::scoped("wide", "user_wide", attrs(NumericType::Float64), &[]);
    let store = VectorStore::open(
        &manager,
        schema,
        Arc::new(HashingEmbedder::new(TEST_DIMENSION)),
    )
    .await
    .expect("should open float64 store");

    let stored = store
        .add("jane", "default", "likes tea")
        .await
        .expect("should add document");

    let hits = store
        .query("jane", "default", "likes tea", 3)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, stored.id);
}

#[tokio::test]
async fn open_rejects_mismatched_embedder() {
    let (manager, _temp_dir) = create_test_manager().await;
    let schema = CollectionSchema::scoped(
        "memory",
        "user_memory",
        attrs(NumericType::Float32),
        &[],
    );

    let result = VectorStore::open(&manager, schema, Arc::new(HashingEmbedder::new(128))).await;

    assert!(matches!(result, Err(VaultError::Configuration(_))));
}
