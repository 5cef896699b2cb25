use std::collections::BTreeSet;

use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::models::Article;
use crate::platform::{in_list, PlatformClient};
use crate::topics::{topic_filter, TopicRepository};

/// Article columns with the source and topic name embedded.
pub const ARTICLE_COLUMNS: &str =
    "id,title,content,url,source:news_sources(id,name,url),topic:predefined_topics(name),created_at";

const REFRESH_FUNCTION: &str = "refresh-news";

#[derive(Clone)]
pub struct NewsRepository {
    client: PlatformClient,
}

impl NewsRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    /// Articles tagged with any of `topic_ids`, newest first.
    pub async fn fetch_by_topics(
        &self,
        topic_ids: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Article>, ServiceError> {
        if topic_ids.is_empty() {
            debug!("No topics selected, skipping article fetch");
            return Ok(Vec::new());
        }

        let request = self.client.rest(Method::GET, "articles").query(&[
            ("select", ARTICLE_COLUMNS.to_string()),
            ("topic_id", format!("in.({})", in_list(topic_ids))),
            ("order", "created_at.desc".to_string()),
        ]);

        let rows = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to fetch news articles", e))?;

        let articles = newest_first(decode_articles(rows));
        debug!(topics = topic_ids.len(), count = articles.len(), "Fetched articles");
        Ok(articles)
    }

    /// The signed-in principal's feed.
    pub async fn fetch_feed(
        &self,
        topics: &TopicRepository,
        cancel: &CancellationToken,
    ) -> Result<Vec<Article>, ServiceError> {
        let user_topics = topics.list_user_topics(cancel).await?;
        self.fetch_by_topics(&topic_filter(&user_topics), cancel)
            .await
    }

    /// Full-text search over titles, newest first.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Article>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.client.rest(Method::GET, "articles").query(&[
            ("select", ARTICLE_COLUMNS.to_string()),
            ("title", format!("fts.{}", query)),
            ("order", "created_at.desc".to_string()),
        ]);

        let rows = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to search news articles", e))?;
        Ok(newest_first(decode_articles(rows)))
    }

    pub async fn get_article(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Article>, ServiceError> {
        let request = self.client.rest(Method::GET, "articles").query(&[
            ("select", ARTICLE_COLUMNS.to_string()),
            ("id", format!("eq.{}", id)),
            ("limit", "1".to_string()),
        ]);

        let rows = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to load article", e))?;
        Ok(decode_articles(rows).into_iter().next())
    }

    /// Ask the backend to pull fresh articles from upstream feeds.
    ///
    /// Returns once the job is accepted, not when it finishes. Fetch again
    /// afterwards to see new articles.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let request = self.client.function(REFRESH_FUNCTION);
        self.client
            .send(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to refresh news", e))?;
        info!("News refresh requested");
        Ok(())
    }
}

/// Decode rows one at a time. A row that cannot be decoded, such as one
/// whose source embed is null, is skipped rather than failing the batch.
fn decode_articles(rows: Vec<serde_json::Value>) -> Vec<Article> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or_default();
            match serde_json::from_value(row) {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(article_id = %id, "Skipping unreadable article: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn newest_first(mut articles: Vec<Article>) -> Vec<Article> {
    articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    articles
}
