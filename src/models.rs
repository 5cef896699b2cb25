use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated principal as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Display name given at sign-up, if any.
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata.get("full_name").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Absolute expiry, unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn principal_id(&self) -> &str {
        &self.user.id
    }

    /// Fill in `expires_at` from `expires_in` when the backend left it out.
    pub fn stamp_expiry(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now.timestamp() + self.expires_in);
        }
        self
    }

    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= (now + margin).timestamp(),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCategory {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredefinedTopic {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: String,
    #[serde(default)]
    pub category: Option<TopicCategory>,
}

/// A user's subscription to a topic.
///
/// On the wire this is a row with two nullable columns,
/// `predefined_topic_id` and `custom_topic_name`, exactly one of which is
/// set. Rows violating that are rejected when decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UserTopicRow", into = "UserTopicRow")]
pub struct UserTopic {
    pub id: String,
    pub kind: UserTopicKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserTopicKind {
    Predefined { topic_id: String },
    Custom { name: String },
}

impl UserTopic {
    pub fn predefined_topic_id(&self) -> Option<&str> {
        match &self.kind {
            UserTopicKind::Predefined { topic_id } => Some(topic_id),
            UserTopicKind::Custom { .. } => None,
        }
    }

    pub fn custom_name(&self) -> Option<&str> {
        match &self.kind {
            UserTopicKind::Custom { name } => Some(name),
            UserTopicKind::Predefined { .. } => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct UserTopicRow {
    id: String,
    #[serde(default)]
    predefined_topic_id: Option<String>,
    #[serde(default)]
    custom_topic_name: Option<String>,
}

impl TryFrom<UserTopicRow> for UserTopic {
    type Error = String;

    fn try_from(row: UserTopicRow) -> Result<Self, Self::Error> {
        let kind = match (row.predefined_topic_id, row.custom_topic_name) {
            (Some(topic_id), None) => UserTopicKind::Predefined { topic_id },
            (None, Some(name)) => UserTopicKind::Custom { name },
            (Some(_), Some(_)) => {
                return Err(format!(
                    "user topic {} has both a predefined topic and a custom name",
                    row.id
                ))
            }
            (None, None) => {
                return Err(format!(
                    "user topic {} has neither a predefined topic nor a custom name",
                    row.id
                ))
            }
        };
        Ok(UserTopic { id: row.id, kind })
    }
}

impl From<UserTopic> for UserTopicRow {
    fn from(topic: UserTopic) -> Self {
        let (predefined_topic_id, custom_topic_name) = match topic.kind {
            UserTopicKind::Predefined { topic_id } => (Some(topic_id), None),
            UserTopicKind::Custom { name } => (None, Some(name)),
        };
        UserTopicRow {
            id: topic.id,
            predefined_topic_id,
            custom_topic_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSource {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Feed item with its source and topic name joined in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ArticleRow")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: NewsSource,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ArticleRow {
    id: String,
    title: String,
    #[serde(default)]
    content: Option<String>,
    url: String,
    source: NewsSource,
    #[serde(default)]
    topic: Option<TopicName>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TopicName {
    name: String,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            title: row.title,
            content: row.content.unwrap_or_default(),
            url: row.url,
            source: row.source,
            topic: row.topic.map(|t| t.name).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}
