use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub fn elapsed_since(self, earlier: TimestampMs) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> TimestampMs;
}

pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(600);

/// A bearer token together with the moment it was obtained.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub obtained_at: TimestampMs,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    max_age_ms: i64,
}

impl RefreshPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age_ms: i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// A session is refreshed when there is none, or when it is strictly older than the max age.
    pub fn needs_refresh(&self, session: Option<&Session>, now: TimestampMs) -> bool {
        match session {
            None => true,
            Some(session) => now.elapsed_since(session.obtained_at) > self.max_age_ms,
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_MAX_AGE)
    }
}
