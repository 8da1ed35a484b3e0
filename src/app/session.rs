use std::sync::{Arc, Mutex, PoisonError};

use crate::adapters::paj_http::PajApi;
use crate::domain::models::Credentials;
use crate::domain::session_state::{Clock, RefreshPolicy, Session};

/// Owns the bearer token of one configured account and shares it across its entities.
///
/// The cache lock is never held across the login call, so two polls racing past
/// the age check may both log in. Both results are equally valid; the later one wins.
pub struct TokenManager<A, Cl> {
    api: Arc<A>,
    clock: Cl,
    credentials: Credentials,
    policy: RefreshPolicy,
    session: Mutex<Option<Session>>,
}

impl<A, Cl> TokenManager<A, Cl>
where
    A: PajApi,
    Cl: Clock,
{
    pub fn new(api: Arc<A>, clock: Cl, credentials: Credentials, policy: RefreshPolicy) -> Self {
        Self {
            api,
            clock,
            credentials,
            policy,
            session: Mutex::new(None),
        }
    }

    /// Returns a usable token, logging in first when none is cached or it has aged out.
    ///
    /// A failed refresh keeps the previous session (without advancing its timestamp,
    /// so the next call retries) and hands that token back for this poll. `None`
    /// means no token has ever been obtained, or the last one was invalidated.
    pub async fn ensure_token(&self) -> Option<String> {
        let now = self.clock.now();
        let cached = self.cached_session();

        if !self.policy.needs_refresh(cached.as_ref(), now) {
            return cached.map(|session| session.token);
        }

        match self.api.login(&self.credentials).await {
            Ok(login) => {
                tracing::info!(
                    user_id = ?login.user_id,
                    refreshed_at_ms = now.0,
                    "bearer token refreshed"
                );
                let token = login.token.clone();
                *self.lock_session() = Some(Session {
                    token: login.token,
                    obtained_at: now,
                });
                Some(token)
            }
            Err(error) => {
                tracing::error!(error = %error, "token refresh failed");
                match cached {
                    Some(previous) => {
                        tracing::warn!("continuing with previous bearer token");
                        Some(previous.token)
                    }
                    None => None,
                }
            }
        }
    }

    /// Drops the cached session after the server rejected its token.
    pub fn invalidate(&self) {
        if self.lock_session().take().is_some() {
            tracing::warn!("bearer token rejected, session dropped");
        }
    }

    pub fn cached_session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
