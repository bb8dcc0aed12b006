//! In-memory credential state for one session.
//!
//! No I/O happens here. Every time-dependent accessor takes `now` so the
//! lifecycle can be exercised without a real clock.

use chrono::{DateTime, Duration, Utc};

use crate::client::ClientError;

/// Subtracted from the provider's `expires_in` to absorb clock skew and request latency.
pub const EXPIRY_MARGIN_SECS: i64 = 60;
/// How long past nominal expiry the refresh token is still assumed usable.
pub const REFRESH_GRACE_SECS: i64 = 24 * 3600;

/// Where the session stands in the credential lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing usable: no access token and no refresh token.
    Unauthenticated,
    /// A refresh token was configured but no access token has been obtained yet.
    Seeded,
    /// Access token present and not expired.
    Valid,
    /// Access token expired, refresh token present and inside the grace window.
    Refreshable,
    /// Access token expired and the refresh token is missing or past its grace window.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl CredentialStore {
    pub fn new(refresh_token: Option<String>) -> Self {
        CredentialStore {
            access_token: None,
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
            expires_at: None,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        match (&self.access_token, self.expires_at) {
            (None, _) | (Some(_), None) => {
                if self.refresh_token.is_some() {
                    CredentialState::Seeded
                } else {
                    CredentialState::Unauthenticated
                }
            }
            (Some(_), Some(expires_at)) if now < expires_at => CredentialState::Valid,
            (Some(_), Some(expires_at)) => {
                let within_grace = expires_at
                    .checked_add_signed(Duration::seconds(REFRESH_GRACE_SECS))
                    .is_none_or(|end| now < end);
                if self.refresh_token.is_some() && within_grace {
                    CredentialState::Refreshable
                } else {
                    CredentialState::Stale
                }
            }
        }
    }

    /// The access token, if present and not expired.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.state(now) {
            CredentialState::Valid => self.access_token.as_deref(),
            _ => None,
        }
    }

    pub fn is_refresh_eligible(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.state(now),
            CredentialState::Seeded | CredentialState::Refreshable
        )
    }

    /// Records a successful exchange. The refresh token is only replaced when
    /// the provider rotated it. An `expires_in` that cannot be represented as
    /// an instant leaves the store untouched.
    pub fn update(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let expires_at = expires_in_secs
            .checked_sub(EXPIRY_MARGIN_SECS)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ClientError::MalformedResponse(format!("token expires_in out of range: {}", expires_in_secs))
            })?;

        self.access_token = Some(access_token);
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(token);
        }
        self.expires_at = Some(expires_at);
        Ok(())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token.as_ref().and(self.expires_at)
    }
}
