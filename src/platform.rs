//! HTTP client for the hosted backend.
//!
//! Three surfaces share one client: `auth/v1` (sign-up, tokens, logout),
//! `rest/v1` (row CRUD with filter query parameters) and `functions/v1`
//! (invocable backend functions). Every request carries the project's anon
//! key, plus the signed-in principal's access token when there is one.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PlatformConfig;
use crate::error::PlatformError;
use crate::session::SessionStore;

const USER_AGENT: &str = "NewsChain/1.0 (News Client)";

/// Ask the REST surface for a single object instead of an array.
pub const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: SessionStore,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, session: SessionStore) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Request against a table on the REST surface.
    pub fn rest(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{}", table))
    }

    pub fn auth(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, &format!("auth/v1/{}", path))
    }

    pub fn function(&self, name: &str) -> RequestBuilder {
        self.request(Method::POST, &format!("functions/v1/{}", name))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());

        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, PlatformError> {
        let body = self.execute(request, cancel).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send and discard the response body.
    pub async fn send(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<(), PlatformError> {
        self.execute(request, cancel).await.map(|_| ())
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PlatformError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request cancelled by caller");
                Err(PlatformError::Cancelled)
            }
            result = exchange(request) => result,
        }
    }
}

async fn exchange(request: RequestBuilder) -> Result<Vec<u8>, PlatformError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        Ok(body.to_vec())
    } else {
        Err(normalize_error(status, &body))
    }
}

/// The error shapes the backend's surfaces produce.
///
/// Auth: `{error_code, msg}` or the older `{error, error_description}`.
/// REST: `{code, message, details, hint}`. Functions: `{error}` or text.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn normalize_error(status: StatusCode, body: &[u8]) -> PlatformError {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    };

    let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) else {
        let text = String::from_utf8_lossy(body).trim().to_string();
        let message = if text.is_empty() { fallback() } else { text };
        return PlatformError::Api {
            status,
            code: None,
            message,
        };
    };

    let error_text = parsed
        .error
        .as_ref()
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let code = parsed
        .error_code
        .or_else(|| {
            parsed
                .code
                .as_ref()
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .or_else(|| {
            // Older auth shape: `error` is the code when a description is present
            parsed
                .error_description
                .as_ref()
                .and(error_text.clone())
        });

    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(error_text)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(fallback);

    PlatformError::Api {
        status,
        code,
        message,
    }
}

/// Value list for an `in.(…)` filter. Values with reserved characters are quoted.
pub fn in_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| {
            let v = v.as_ref();
            if v.contains([',', '(', ')', '"', ' ']) {
                format!("\"{}\"", v.replace('"', "\\\""))
            } else {
                v.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
