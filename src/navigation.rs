//! Screen routes and the session guard in front of the authenticated flow.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::models::Session;
use crate::session::{SessionStore, SessionSubscription};

pub const DEEP_LINK_SCHEME: &str = "newschain://";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Welcome,
    Login,
    Register,
    VerifyEmail,
    Home,
    Topics,
    Profile,
    Article(String),
}

impl Route {
    pub fn flow(&self) -> Flow {
        match self {
            Route::Welcome | Route::Login | Route::Register | Route::VerifyEmail => {
                Flow::Unauthenticated
            }
            Route::Home | Route::Topics | Route::Profile | Route::Article(_) => Flow::Authenticated,
        }
    }

    /// Parse a route path such as `topics` or `article/42`.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.trim_matches('/');
        let route = match path {
            "welcome" => Route::Welcome,
            "login" => Route::Login,
            "register" => Route::Register,
            "verify-email" => Route::VerifyEmail,
            "home" => Route::Home,
            "topics" => Route::Topics,
            "profile" => Route::Profile,
            _ => {
                let id = path.strip_prefix("article/")?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                Route::Article(id.to_string())
            }
        };
        Some(route)
    }

    /// Parse a `newschain://…` link. Query strings and fragments are ignored.
    pub fn from_deep_link(link: &str) -> Option<Route> {
        let rest = link.strip_prefix(DEEP_LINK_SCHEME)?;
        let path = rest.split(['?', '#']).next().unwrap_or_default();
        Route::from_path(path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Welcome => write!(f, "welcome"),
            Route::Login => write!(f, "login"),
            Route::Register => write!(f, "register"),
            Route::VerifyEmail => write!(f, "verify-email"),
            Route::Home => write!(f, "home"),
            Route::Topics => write!(f, "topics"),
            Route::Profile => write!(f, "profile"),
            Route::Article(id) => write!(f, "article/{}", id),
        }
    }
}

/// Where to send the user instead of `route`, if anywhere.
pub fn guard(session: Option<&Session>, route: &Route) -> Option<Route> {
    match (session, route.flow()) {
        (None, Flow::Authenticated) => Some(Route::Login),
        _ => None,
    }
}

/// Owns the current route and keeps it consistent with the session.
pub struct Navigator {
    route: Arc<watch::Sender<Route>>,
    session: SessionStore,
    _subscription: SessionSubscription,
}

impl Navigator {
    /// Start at `initial` (guarded) and follow session changes.
    pub fn mount(session: &SessionStore, initial: Route) -> Self {
        let initial = guard(session.current().as_ref(), &initial).unwrap_or(initial);
        let route = Arc::new(watch::channel(initial).0);

        let tx = Arc::clone(&route);
        let subscription = session.on_session_change(move |_event, session| {
            tx.send_if_modified(|current| match guard(session, current) {
                Some(redirect) => {
                    info!(from = %current, to = %redirect, "Session ended, redirecting");
                    *current = redirect;
                    true
                }
                None => false,
            });
        });

        Self {
            route,
            session: session.clone(),
            _subscription: subscription,
        }
    }

    pub fn current(&self) -> Route {
        self.route.borrow().clone()
    }

    /// Receiver that observes every route change.
    pub fn routes(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }

    /// Go to `route`, or to its redirect when the guard refuses it. Returns
    /// the route actually shown.
    pub fn navigate(&self, route: Route) -> Route {
        let target = guard(self.session.current().as_ref(), &route).unwrap_or(route);
        self.route.send_replace(target.clone());
        target
    }
}
