use super::*;
use tempfile::NamedTempFile;


/// Helper to create a store backed by a fresh temp-file database
async fn create_test_store() -> (SqliteStore, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let store = SqliteStore::new(temp_file.path()).await.unwrap();
    (store, temp_file)
}

/// Helper to stage an article with a throwaway payload
async fn stage_article(store: &SqliteStore, id: &str) -> Article {
    store
        .insert_article(&NewArticle {
            id: ArticleId::new(id),
            payload: format!("payload for {id}"),
        })
        .await
        .unwrap()
}
