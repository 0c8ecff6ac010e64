//! Article CRUD and compare-and-set operations.

use crate::error::DatabaseError;
use crate::types::{ArticleId, ArticleState};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Article, ArticleMutation, ArticleRow, ArticleStore, NewArticle, SqliteStore};

const SELECT_COLUMNS: &str = r#"
    id, state, payload, attempt_count, last_error,
    version, lease_expires_at, created_at, updated_at
"#;

impl SqliteStore {
    /// Fetch an article by id
    pub async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get article: {}",
                e
            )))
        })?;

        Ok(row.map(Article::from))
    }

    /// Stage a new article at version 1
    pub async fn insert_article(&self, article: &NewArticle) -> Result<Article> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO articles (
                id, state, payload, attempt_count, last_error,
                version, lease_expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, 0, NULL, 1, NULL, ?, ?)
            "#,
        )
        .bind(&article.id)
        .bind(ArticleState::Staged.to_i32())
        .bind(&article.payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::Database(
                DatabaseError::ConstraintViolation(format!("article {} already staged", article.id)),
            ),
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert article: {}",
                e
            ))),
        })?;

        self.get_article(&article.id)
            .await?
            .ok_or_else(|| Error::NotFound(article.id.to_string()))
    }

    /// Atomically apply a mutation if the current version matches
    ///
    /// The version check and the update happen in a single statement, so two
    /// workers racing on the same article can never both succeed: the WHERE
    /// clause matches at most one of them.
    pub async fn compare_and_set_article(
        &self,
        id: &ArticleId,
        expected_version: i64,
        mutation: ArticleMutation,
    ) -> Result<Article> {
        let now = chrono::Utc::now().timestamp();
        let attempt_delta: i64 = if mutation.increment_attempt { 1 } else { 0 };

        let result = sqlx::query(
            r#"
            UPDATE articles
            SET state = ?,
                lease_expires_at = ?,
                last_error = ?,
                attempt_count = attempt_count + ?,
                version = version + 1,
                updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(mutation.state.to_i32())
        .bind(mutation.lease_expires_at)
        .bind(&mutation.last_error)
        .bind(attempt_delta)
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to compare-and-set article: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a stale version
            return match self.get_article(id).await? {
                None => Err(Error::NotFound(id.to_string())),
                Some(_) => Err(Error::Conflict {
                    id: id.to_string(),
                    expected: expected_version,
                }),
            };
        }

        self.get_article(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// List articles eligible for claiming, oldest first
    pub async fn list_staged_or_expired_articles(
        &self,
        now: i64,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM articles
            WHERE state = ?
               OR (state = ? AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#
        ))
        .bind(ArticleState::Staged.to_i32())
        .bind(ArticleState::Processing.to_i32())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list staged or expired articles: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Count articles in a given state
    pub async fn count_articles_by_state(&self, state: ArticleState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE state = ?")
            .bind(state.to_i32())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count articles by state: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn get(&self, id: &ArticleId) -> Result<Option<Article>> {
        self.get_article(id).await
    }

    async fn insert(&self, article: &NewArticle) -> Result<Article> {
        self.insert_article(article).await
    }

    async fn compare_and_set(
        &self,
        id: &ArticleId,
        expected_version: i64,
        mutation: ArticleMutation,
    ) -> Result<Article> {
        self.compare_and_set_article(id, expected_version, mutation)
            .await
    }

    async fn list_staged_or_expired(&self, now: i64, limit: usize) -> Result<Vec<Article>> {
        self.list_staged_or_expired_articles(now, limit).await
    }

    async fn count_by_state(&self, state: ArticleState) -> Result<i64> {
        self.count_articles_by_state(state).await
    }
}
