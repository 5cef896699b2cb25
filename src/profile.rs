use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServiceError;
use crate::models::Profile;
use crate::platform::{PlatformClient, SINGLE_OBJECT};

#[derive(Clone)]
pub struct ProfileRepository {
    client: PlatformClient,
}

impl ProfileRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    pub async fn get_profile(&self, cancel: &CancellationToken) -> Result<Profile, ServiceError> {
        let user_id = self.principal_id()?;
        let request = self
            .client
            .rest(Method::GET, "profiles")
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", user_id))]);

        self.client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to load profile", e))
    }

    pub async fn update_display_name(
        &self,
        full_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Profile, ServiceError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(ServiceError::Invalid("Name cannot be empty".to_string()));
        }
        let user_id = self.principal_id()?;

        let request = self
            .client
            .rest(Method::PATCH, "profiles")
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .json(&json!({
                "full_name": full_name,
                "updated_at": Utc::now(),
            }));

        let profile = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| ServiceError::wrap("Failed to update profile", e))?;
        info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    fn principal_id(&self) -> Result<String, ServiceError> {
        self.client
            .session()
            .current()
            .map(|s| s.principal_id().to_string())
            .ok_or(ServiceError::NotSignedIn)
    }
}

/// Unsaved edits to the profile form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDraft {
    saved: String,
    name: String,
}

impl ProfileDraft {
    pub fn begin(profile: &Profile) -> Self {
        let saved = profile.display_name().to_string();
        Self {
            name: saved.clone(),
            saved,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_dirty(&self) -> bool {
        self.name.trim() != self.saved.trim()
    }

    pub fn can_save(&self) -> bool {
        self.is_dirty() && !self.name.trim().is_empty()
    }

    pub fn discard(&mut self) {
        self.name = self.saved.clone();
    }
}

/// First letter of each word, upper-cased. `"?"` when there are none.
pub fn initials(full_name: &str) -> String {
    let letters: String = full_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();

    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{signed_in_client, test_client, test_session};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(name: Option<&str>) -> Profile {
        Profile {
            id: "user-1".to_string(),
            full_name: name.map(str::to_string),
            email: Some("reader@example.com".to_string()),
            avatar_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    mod initials_tests {
        use super::*;

        #[test]
        fn test_initials() {
            assert_eq!(initials("Ada Lovelace"), "AL");
            assert_eq!(initials("  grace   brewster hopper "), "GBH");
            assert_eq!(initials("Émile"), "É");
        }

        #[test]
        fn test_initials_blank() {
            assert_eq!(initials(""), "?");
            assert_eq!(initials("   "), "?");
        }
    }

    mod draft_tests {
        use super::*;

        #[test]
        fn test_fresh_draft_is_clean() {
            let draft = ProfileDraft::begin(&profile(Some("Ada")));
            assert_eq!(draft.name(), "Ada");
            assert!(!draft.is_dirty());
            assert!(!draft.can_save());
        }

        #[test]
        fn test_whitespace_only_change_is_not_dirty() {
            let mut draft = ProfileDraft::begin(&profile(Some("Ada")));
            draft.set_name(" Ada ");
            assert!(!draft.is_dirty());
        }

        #[test]
        fn test_edit_and_discard() {
            let mut draft = ProfileDraft::begin(&profile(Some("Ada")));
            draft.set_name("Ada Lovelace");
            assert!(draft.is_dirty());
            assert!(draft.can_save());

            draft.discard();
            assert_eq!(draft.name(), "Ada");
            assert!(!draft.is_dirty());
        }

        #[test]
        fn test_cleared_name_is_dirty_but_unsaveable() {
            let mut draft = ProfileDraft::begin(&profile(Some("Ada")));
            draft.set_name("  ");
            assert!(draft.is_dirty());
            assert!(!draft.can_save());
        }

        #[test]
        fn test_profile_without_name() {
            let mut draft = ProfileDraft::begin(&profile(None));
            assert_eq!(draft.name(), "");
            draft.set_name("Ada");
            assert!(draft.can_save());
        }
    }

    mod repository_tests {
        use super::*;

        #[tokio::test]
        async fn test_get_profile_for_principal() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/profiles"))
                .and(query_param("id", "eq.user-1"))
                .and(header("Accept", SINGLE_OBJECT))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "user-1",
                    "full_name": "Ada Reader",
                    "email": "reader@example.com"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let repo = ProfileRepository::new(signed_in_client(&server, test_session("user-1")));
            let profile = repo.get_profile(&CancellationToken::new()).await.unwrap();
            assert_eq!(profile.display_name(), "Ada Reader");
        }

        #[tokio::test]
        async fn test_get_profile_requires_session() {
            let server = MockServer::start().await;
            let err = ProfileRepository::new(test_client(&server))
                .get_profile(&CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotSignedIn));
        }

        #[tokio::test]
        async fn test_update_display_name() {
            let server = MockServer::start().await;
            Mock::given(method("PATCH"))
                .and(path("/rest/v1/profiles"))
                .and(query_param("id", "eq.user-1"))
                .and(body_partial_json(json!({ "full_name": "Ada Lovelace" })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "user-1",
                    "full_name": "Ada Lovelace"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let repo = ProfileRepository::new(signed_in_client(&server, test_session("user-1")));
            let profile = repo
                .update_display_name("  Ada Lovelace ", &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
        }

        #[tokio::test]
        async fn test_blank_display_name_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("PATCH"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let repo = ProfileRepository::new(signed_in_client(&server, test_session("user-1")));
            let err = repo
                .update_display_name("   ", &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Invalid(_)));
        }
    }
}
