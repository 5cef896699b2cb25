//! Sign-up, sign-in, sign-out and token refresh against the auth surface.
//!
//! Backend failures are mapped onto `AuthError` by [`classify`]. The
//! backend's messages are not a stable contract, so the mapping prefers a
//! structured error code and only falls back to matching message text.

use std::time::Duration;

use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthErrorKind, PlatformError};
use crate::models::{Session, User};
use crate::navigation::Route;
use crate::platform::PlatformClient;
use crate::session::{AuthEvent, SessionStore};

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect email or password. Please try again.";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network connection error. Please check your internet connection.";
pub const SESSION_ENDED_MESSAGE: &str = "Session ended during refresh";
pub const VERIFICATION_PENDING_MESSAGE: &str = "Please check your email for verification link";

const MIN_PASSWORD_LEN: usize = 8;
const MIN_DISPLAY_NAME_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// The account is usable right away; the session is already published.
    Complete(Session),
    /// The backend wants the email confirmed before it issues a session.
    PendingVerification { user: User, message: String },
}

impl Registration {
    pub fn is_pending(&self) -> bool {
        matches!(self, Registration::PendingVerification { .. })
    }

    /// Where the caller goes next.
    pub fn next_route(&self) -> Route {
        match self {
            Registration::Complete(_) => Route::Home,
            Registration::PendingVerification { .. } => Route::VerifyEmail,
        }
    }
}

/// The auth endpoints answer with a session, or with a bare user when no
/// session was issued.
#[derive(Deserialize)]
#[serde(untagged)]
enum AuthResponse {
    Session(Session),
    User(User),
}

#[derive(Clone)]
pub struct AuthGateway {
    client: PlatformClient,
    redirect_to: String,
    refresh_margin: chrono::Duration,
}

impl AuthGateway {
    pub fn new(client: PlatformClient, config: &AuthConfig) -> Self {
        Self {
            client,
            redirect_to: config.redirect_to.clone(),
            refresh_margin: chrono::Duration::seconds(config.refresh_margin_secs as i64),
        }
    }

    pub fn session(&self) -> &SessionStore {
        self.client.session()
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        self.refresh_margin
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Registration, AuthError> {
        validate_registration(email, password, display_name)?;
        let email = email.trim();

        let request = self
            .client
            .auth(Method::POST, "signup")
            .query(&[("redirect_to", self.redirect_to.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": display_name.trim() },
            }));

        let response: AuthResponse = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| classify(AuthOperation::Register, e))?;

        match response {
            AuthResponse::Session(session) => {
                let session = session.stamp_expiry(Utc::now());
                info!(user_id = %session.principal_id(), "Registered and signed in");
                self.session()
                    .publish(AuthEvent::SignedIn, Some(session.clone()));
                Ok(Registration::Complete(session))
            }
            AuthResponse::User(user) => {
                info!(user_id = %user.id, "Registered, email confirmation pending");
                Ok(Registration::PendingVerification {
                    user,
                    message: VERIFICATION_PENDING_MESSAGE.to_string(),
                })
            }
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        validate_login(email, password)?;

        let request = self
            .client
            .auth(Method::POST, "token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email.trim(), "password": password }));

        let response: AuthResponse = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| classify(AuthOperation::Login, e))?;

        let AuthResponse::Session(session) = response else {
            warn!("Sign-in succeeded without a session");
            return Err(AuthError::general("No session created after login"));
        };

        let session = session.stamp_expiry(Utc::now());
        info!(user_id = %session.principal_id(), "Signed in");
        self.session()
            .publish(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Revoke the session on the backend and clear it locally.
    ///
    /// The local session is cleared even when the revoke call fails, so the
    /// caller can always route to the unauthenticated flow.
    pub async fn logout(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let result = if self.session().is_signed_in() {
            let request = self.client.auth(Method::POST, "logout");
            self.client
                .send(request, cancel)
                .await
                .map_err(|e| classify(AuthOperation::Logout, e))
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            warn!("Sign-out request failed, clearing local session anyway: {}", e);
        }
        self.session().publish(AuthEvent::SignedOut, None);
        result
    }

    /// Exchange the current refresh token for a new session.
    ///
    /// A rejected refresh token means the session is gone on the backend,
    /// so it is cleared locally as well. The result is only published if
    /// the session it started from is still current; a sign-out while the
    /// exchange is in flight wins.
    pub async fn refresh_session(&self, cancel: &CancellationToken) -> Result<Session, AuthError> {
        let Some(current) = self.session().current() else {
            return Err(AuthError::general("Not signed in"));
        };

        match self
            .exchange_refresh_token(&current.refresh_token, cancel)
            .await
        {
            Ok(session) => {
                let published = self.session().publish_if_current(
                    &current.refresh_token,
                    AuthEvent::TokenRefreshed,
                    Some(session.clone()),
                );
                if !published {
                    warn!("Session ended while refreshing, discarding new tokens");
                    return Err(AuthError::general(SESSION_ENDED_MESSAGE));
                }
                Ok(session)
            }
            Err(e) => {
                if e.is_rejected() {
                    warn!("Refresh token rejected, signing out: {}", e);
                    self.session().publish_if_current(
                        &current.refresh_token,
                        AuthEvent::SignedOut,
                        None,
                    );
                }
                Err(e)
            }
        }
    }

    /// Token exchange without publishing the result.
    pub(crate) async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        let request = self
            .client
            .auth(Method::POST, "token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));

        let response: AuthResponse = self
            .client
            .send_json(request, cancel)
            .await
            .map_err(|e| classify(AuthOperation::Refresh, e))?;

        match response {
            AuthResponse::Session(session) => Ok(session.stamp_expiry(Utc::now())),
            AuthResponse::User(_) => Err(AuthError::general("No session returned from refresh")),
        }
    }
}

/// Keep the session fresh until `cancel` fires.
pub async fn start_token_refresh(
    gateway: AuthGateway,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Starting session auto-refresh");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(session) = gateway.session().current() else {
            continue;
        };
        if !session.expires_within(Utc::now(), gateway.refresh_margin()) {
            continue;
        }

        info!("Session close to expiry, refreshing");
        if let Err(e) = gateway.refresh_session(&cancel).await {
            if e.is_cancelled() {
                break;
            }
            error!("Scheduled session refresh failed: {}", e);
        }
    }

    info!("Session auto-refresh stopped");
}

fn validate_registration(email: &str, password: &str, display_name: &str) -> Result<(), AuthError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(AuthError::new(AuthErrorKind::DisplayName, "Name is required"));
    }
    if display_name.chars().count() < MIN_DISPLAY_NAME_LEN {
        return Err(AuthError::new(
            AuthErrorKind::DisplayName,
            "Name must be at least 2 characters",
        ));
    }

    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::new(AuthErrorKind::Email, "Email is required"));
    }
    if !is_valid_email(email) {
        return Err(AuthError::new(
            AuthErrorKind::Email,
            "Please enter a valid email address",
        ));
    }

    if password.is_empty() {
        return Err(AuthError::new(AuthErrorKind::Password, "Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::new(
            AuthErrorKind::Password,
            "Password must be at least 8 characters",
        ));
    }

    Ok(())
}

fn validate_login(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::new(AuthErrorKind::Email, "Email is required"));
    }
    if password.is_empty() {
        return Err(AuthError::new(AuthErrorKind::Password, "Password is required"));
    }
    Ok(())
}

/// `local@domain.tld`: one `@`, no whitespace, a dot inside the domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Register,
    Login,
    Logout,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Credentials,
    Email,
    Password,
}

fn class_for_code(code: &str) -> Option<Class> {
    match code {
        "invalid_credentials" => Some(Class::Credentials),
        "weak_password" | "same_password" => Some(Class::Password),
        "user_already_exists" | "email_exists" => Some(Class::Email),
        c if c.starts_with("email_") => Some(Class::Email),
        _ => None,
    }
}

fn class_for_message(message: &str) -> Option<Class> {
    let lowered = message.to_lowercase();
    if lowered.contains("invalid login credentials") {
        Some(Class::Credentials)
    } else if lowered.contains("email") {
        Some(Class::Email)
    } else if lowered.contains("password") {
        Some(Class::Password)
    } else {
        None
    }
}

/// Map a backend failure onto the field it should be reported against.
///
/// Bad credentials on login always collapse into one message that does
/// not say which field was wrong.
pub fn classify(operation: AuthOperation, error: PlatformError) -> AuthError {
    match &error {
        PlatformError::Cancelled => return AuthError::cancelled(),
        PlatformError::Transport(_) => {
            error!("Auth request failed ({:?}): {}", operation, error);
            return AuthError::general(NETWORK_ERROR_MESSAGE).with_source(error);
        }
        _ => {}
    }

    let message = error.message();
    let class = error
        .code()
        .and_then(class_for_code)
        .or_else(|| class_for_message(&message));

    warn!(?operation, code = ?error.code(), "Auth request rejected: {}", message);

    let classified = match class {
        Some(Class::Credentials) if operation == AuthOperation::Login => {
            AuthError::general(INVALID_CREDENTIALS_MESSAGE)
        }
        Some(Class::Email) => AuthError::new(AuthErrorKind::Email, message),
        Some(Class::Password) => AuthError::new(AuthErrorKind::Password, message),
        _ => AuthError::general(message),
    };
    classified.with_source(error)
}
