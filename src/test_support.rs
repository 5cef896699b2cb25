use chrono::Utc;
use serde_json::json;
use wiremock::MockServer;

use crate::config::PlatformConfig;
use crate::models::{Session, User};
use crate::platform::PlatformClient;
use crate::session::{AuthEvent, SessionStore};

pub const ANON_KEY: &str = "anon-key";

pub fn test_config(server: &MockServer) -> PlatformConfig {
    PlatformConfig {
        url: server.uri(),
        anon_key: ANON_KEY.to_string(),
        timeout_secs: 5,
    }
}

pub fn client_with_store(server: &MockServer, store: SessionStore) -> PlatformClient {
    PlatformClient::new(&test_config(server), store).unwrap()
}

pub fn test_client(server: &MockServer) -> PlatformClient {
    client_with_store(server, SessionStore::new())
}

pub fn signed_in_client(server: &MockServer, session: Session) -> PlatformClient {
    let store = SessionStore::new();
    store.publish(AuthEvent::SignedIn, Some(session));
    client_with_store(server, store)
}

/// Session valid for another hour.
pub fn test_session(user_id: &str) -> Session {
    Session {
        access_token: format!("access-{}", user_id),
        token_type: "bearer".to_string(),
        refresh_token: format!("refresh-{}", user_id),
        expires_in: 3600,
        expires_at: Some(Utc::now().timestamp() + 3600),
        user: User {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
            user_metadata: json!({ "full_name": "Ada Reader" }),
            created_at: None,
        },
    }
}
