use super::*;
use crate::store::MetadataValue;
use tempfile::TempDir;

fn test_record(id: &str, vector: Vec<f32>) -> Record {
    let mut metadata = Metadata::new();
    metadata.insert("file_path".to_string(), MetadataValue::from("src/lib.rs"));
    metadata.insert("chunk_index".to_string(), MetadataValue::from(0_i64));
    Record {
        id: id.to_string(),
        document: format!("content of {}", id),
        metadata,
        vector,
    }
}

async fn open_collection(temp_dir: &TempDir) -> LanceCollection {
    LanceCollection::open(&temp_dir.path().join("vectors"), "code-snippets")
        .await
        .expect("should open collection")
}

#[tokio::test]
async fn table_is_created_lazily() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut collection = open_collection(&temp_dir).await;

    assert_eq!(collection.table_name(), "code-snippets");
    assert_eq!(collection.vector_dimension(), None);
    assert_eq!(collection.count().await.expect("should count"), 0);

    let empty = collection
        .nearest(&[1.0, 0.0, 0.0], 3)
        .await
        .expect("query before first insert should succeed");
    assert!(empty.documents.is_empty());

    collection
        .upsert(vec![test_record("a", vec![1.0, 0.0, 0.0])])
        .await
        .expect("should upsert");
    assert_eq!(collection.vector_dimension(), Some(3));
    assert_eq!(collection.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn nearest_returns_closest_first_with_metadata() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut collection = open_collection(&temp_dir).await;

    collection
        .upsert(vec![
            test_record("x", vec![1.0, 0.0, 0.0]),
            test_record("y", vec![0.0, 1.0, 0.0]),
            test_record("z", vec![0.0, 0.0, 1.0]),
        ])
        .await
        .expect("should upsert");

    let result = collection
        .nearest(&[0.1, 0.9, 0.0], 2)
        .await
        .expect("should query");

    assert_eq!(result.documents.len(), 2);
    assert_eq!(result.documents[0], "content of y");
    assert_eq!(
        result.metadatas[0].get("file_path"),
        Some(&MetadataValue::from("src/lib.rs"))
    );
    assert_eq!(
        result.metadatas[0].get("chunk_index"),
        Some(&MetadataValue::Int(0))
    );
}

#[tokio::test]
async fn upsert_replaces_existing_ids() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut collection = open_collection(&temp_dir).await;

    collection
        .upsert(vec![test_record("same", vec![1.0, 0.0])])
        .await
        .expect("should upsert");
    let mut replacement = test_record("same", vec![0.0, 1.0]);
    replacement.document = "replaced".to_string();
    collection
        .upsert(vec![replacement])
        .await
        .expect("should upsert again");

    assert_eq!(collection.count().await.expect("should count"), 1);
    let result = collection.nearest(&[0.0, 1.0], 1).await.expect("should query");
    assert_eq!(result.documents, vec!["replaced"]);
}

#[tokio::test]
async fn remove_deletes_listed_ids_only() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut collection = open_collection(&temp_dir).await;

    collection
        .upsert(vec![
            test_record("keep", vec![1.0, 0.0]),
            test_record("it's-gone", vec![0.0, 1.0]),
        ])
        .await
        .expect("should upsert");

    collection
        .remove(&["it's-gone".to_string(), "never-stored".to_string()])
        .await
        .expect("should remove");

    assert_eq!(collection.count().await.expect("should count"), 1);
    let result = collection.nearest(&[0.0, 1.0], 5).await.expect("should query");
    assert_eq!(result.documents, vec!["content of keep"]);
}

#[tokio::test]
async fn dimension_mismatch_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut collection = open_collection(&temp_dir).await;

    collection
        .upsert(vec![test_record("a", vec![1.0, 0.0, 0.0])])
        .await
        .expect("should upsert");

    let err = collection
        .upsert(vec![test_record("b", vec![1.0, 0.0])])
        .await
        .expect_err("different dimension should fail");
    assert!(err.to_string().contains("dimension mismatch"));

    assert!(collection.nearest(&[1.0], 1).await.is_err());
    assert_eq!(collection.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn data_persists_across_reopen() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let mut collection = open_collection(&temp_dir).await;
        collection
            .upsert(vec![test_record("persisted", vec![0.5, 0.5])])
            .await
            .expect("should upsert");
        collection.close().await.expect("should close");
    }

    let reopened = open_collection(&temp_dir).await;
    assert_eq!(reopened.vector_dimension(), Some(2));
    assert_eq!(reopened.count().await.expect("should count"), 1);
}

#[test]
fn quote_escapes_single_quotes() {
    assert_eq!(quote("plain"), "'plain'");
    assert_eq!(quote("it's"), "'it''s'");
}
