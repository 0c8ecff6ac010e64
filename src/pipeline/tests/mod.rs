use super::*;
use crate::config::PipelineConfig;
use crate::db::SqliteStore;
use crate::types::{ArticleState, ItemOutcome, Outcome, Verdict};
use async_trait::async_trait;
use std::collections::HashMap;
use tempfile::NamedTempFile;

mod dispatcher;

/// Processor that looks up verdicts per article id, defaulting to Publish
struct VerdictMap {
    verdicts: HashMap<String, Verdict>,
}

impl VerdictMap {
    fn publish_all() -> Self {
        Self {
            verdicts: HashMap::new(),
        }
    }

    fn with(mut self, id: &str, verdict: Verdict) -> Self {
        self.verdicts.insert(id.to_string(), verdict);
        self
    }
}

#[async_trait]
impl ArticleProcessor for VerdictMap {
    async fn process(&self, article: &Article) -> Verdict {
        self.verdicts
            .get(article.id.as_str())
            .cloned()
            .unwrap_or(Verdict::Publish)
    }
}

/// Test configuration with a short lease and cycle-friendly limits
fn test_config() -> Config {
    Config {
        pipeline: PipelineConfig {
            batch_size: 32,
            concurrency: 3,
            lease_duration_secs: 60,
            max_attempts: 3,
        },
        ..Default::default()
    }
}

/// Helper to create a pipeline over a fresh temp-file database
async fn create_test_pipeline(
    mut config: Config,
    processor: Arc<dyn ArticleProcessor>,
) -> (ArticlePipeline, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    config.persistence.database_path = temp_file.path().to_path_buf();
    let pipeline = ArticlePipeline::with_sqlite(config, processor)
        .await
        .unwrap();
    (pipeline, temp_file)
}

/// Helper to create a store and engine with an explicit lease duration
async fn create_test_engine(
    lease: chrono::Duration,
) -> (Arc<TransitionEngine>, Arc<SqliteStore>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let store = Arc::new(SqliteStore::new(temp_file.path()).await.unwrap());
    let engine = Arc::new(TransitionEngine::new(
        store.clone() as Arc<dyn ArticleStore>,
        lease,
    ));
    (engine, store, temp_file)
}

/// Helper to stage an article directly through the store
async fn stage_article(store: &SqliteStore, id: &str) -> Article {
    store
        .insert_article(&NewArticle {
            id: ArticleId::new(id),
            payload: format!("payload for {id}"),
        })
        .await
        .unwrap()
}
