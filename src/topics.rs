use std::collections::BTreeSet;

use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::models::{PredefinedTopic, TopicCategory, UserTopic};
use crate::platform::{PlatformClient, SINGLE_OBJECT};

const USER_TOPICS: &str = "user_topics";

/// Outcome of [`TopicRepository::toggle_topic`].
#[derive(Debug, Clone, PartialEq)]
pub enum Toggled {
    Subscribed(UserTopic),
    Unsubscribed,
}

impl Toggled {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Toggled::Subscribed(_))
    }
}

#[derive(Clone)]
pub struct TopicRepository {
    client: PlatformClient,
}

impl TopicRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    pub async fn list_categories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<TopicCategory>, ServiceError> {
        let request = self
            .client
            .rest(Method::GET, "topic_categories")
            .query(&[("select", "*"), ("order", "display_order.asc")]);

        let mut categories: Vec<TopicCategory> = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to load topic categories", e))?;

        categories.sort_by_key(|c| c.display_order);
        Ok(categories)
    }

    pub async fn list_predefined_topics(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<PredefinedTopic>, ServiceError> {
        let request = self.client.rest(Method::GET, "predefined_topics").query(&[
            ("select", "*,category:topic_categories(*)"),
            ("order", "name.asc"),
        ]);

        let mut topics: Vec<PredefinedTopic> = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to load topics", e))?;

        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    /// The signed-in principal's subscriptions.
    pub async fn list_user_topics(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<UserTopic>, ServiceError> {
        let user_id = self.principal_id()?;
        let request = self
            .client
            .rest(Method::GET, USER_TOPICS)
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{}", user_id))]);

        self.client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to load your topics", e))
    }

    /// Subscribe to a predefined topic, or unsubscribe if already subscribed.
    ///
    /// Read then write, with no version check: two concurrent toggles of the
    /// same topic race and the last write wins.
    pub async fn toggle_topic(
        &self,
        topic_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Toggled, ServiceError> {
        let user_id = self.principal_id()?;
        let filter = [
            ("user_id", format!("eq.{}", user_id)),
            ("predefined_topic_id", format!("eq.{}", topic_id)),
        ];

        let lookup = self
            .client
            .rest(Method::GET, USER_TOPICS)
            .query(&[("select", "id")])
            .query(&filter);
        let existing: Vec<serde_json::Value> = self
            .client
            .send_json(lookup, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to update topic", e))?;

        if !existing.is_empty() {
            let delete = self.client.rest(Method::DELETE, USER_TOPICS).query(&filter);
            self.client
                .send(delete, cancel)
                .await
                .map_err(|e| ServiceError::wrap("Failed to update topic", e))?;
            info!(topic_id = %topic_id, "Unsubscribed from topic");
            return Ok(Toggled::Unsubscribed);
        }

        let topic = self
            .insert(
                json!({ "user_id": user_id, "predefined_topic_id": topic_id }),
                cancel,
            )
            .await
            .map_err(|e| ServiceError::wrap("Failed to update topic", e))?;
        info!(topic_id = %topic_id, "Subscribed to topic");
        Ok(Toggled::Subscribed(topic))
    }

    pub async fn add_custom_topic(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<UserTopic, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Invalid(
                "Custom topic name cannot be empty".to_string(),
            ));
        }
        let user_id = self.principal_id()?;

        let topic = self
            .insert(
                json!({ "user_id": user_id, "custom_topic_name": name }),
                cancel,
            )
            .await
            .map_err(|e| ServiceError::wrap("Failed to add custom topic", e))?;
        info!(name = %name, "Added custom topic");
        Ok(topic)
    }

    /// Drop one subscription by its own id.
    pub async fn remove_user_topic(
        &self,
        user_topic_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let user_id = self.principal_id()?;
        let request = self.client.rest(Method::DELETE, USER_TOPICS).query(&[
            ("id", format!("eq.{}", user_topic_id)),
            ("user_id", format!("eq.{}", user_id)),
        ]);

        self.client
            .send(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to remove topic", e))?;
        debug!(user_topic_id = %user_topic_id, "Removed user topic");
        Ok(())
    }

    async fn insert(
        &self,
        row: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<UserTopic, crate::error::PlatformError> {
        let request = self
            .client
            .rest(Method::POST, USER_TOPICS)
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .json(&row);
        self.client.send_json(request, cancel).await
    }

    fn principal_id(&self) -> Result<String, ServiceError> {
        self.client
            .session()
            .current()
            .map(|s| s.principal_id().to_string())
            .ok_or(ServiceError::NotSignedIn)
    }
}

/// Predefined topic ids to filter the feed by. Custom topics have no
/// article linkage and are left out.
pub fn topic_filter(user_topics: &[UserTopic]) -> BTreeSet<String> {
    user_topics
        .iter()
        .filter_map(|t| t.predefined_topic_id())
        .map(str::to_string)
        .collect()
}

/// Pair each category with its topics, categories by display order and
/// topics by name. Categories without topics are kept.
pub fn group_by_category(
    categories: &[TopicCategory],
    topics: &[PredefinedTopic],
) -> Vec<(TopicCategory, Vec<PredefinedTopic>)> {
    let mut categories = categories.to_vec();
    categories.sort_by_key(|c| c.display_order);

    categories
        .into_iter()
        .map(|category| {
            let mut members: Vec<PredefinedTopic> = topics
                .iter()
                .filter(|t| t.category_id == category.id)
                .cloned()
                .collect();
            members.sort_by(|a, b| a.name.cmp(&b.name));
            (category, members)
        })
        .collect()
}
