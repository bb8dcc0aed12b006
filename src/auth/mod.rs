//! OAuth2 token lifecycle against the Netatmo token endpoint.
//!
//! Order of attempts when a token is needed:
//! - a configured refresh token is tried before anything else when no access token exists yet
//! - a valid access token is returned as is
//! - an expired token inside the refresh grace window is refreshed
//! - otherwise a password grant, first without scope, then with each candidate scope
//!
//! A failed refresh always falls through to the password grant.

pub mod store;

use chrono::{DateTime, Utc};
use core::fmt;
use http::Method;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::client::ClientError;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::utils::{decode_json, excerpt};
use store::{CredentialState, CredentialStore};

pub const USER_AGENT: &str = concat!("netatmo-thermostat/", env!("CARGO_PKG_VERSION"));

/// Netatmo issues three-hour tokens; used when a response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 10800;

/// Broadest combined scope first, then each scope on its own.
pub const SCOPE_CANDIDATES: [&str; 3] = ["read_thermostat write_thermostat", "read_thermostat", "write_thermostat"];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Grant {
    Password,
    Refresh,
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Password => write!(f, "authentication"),
            Grant::Refresh => write!(f, "token refresh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// HTML answer: the request never reached the OAuth application.
    Blocked,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    /// Any other `error` code returned by the provider.
    Provider(String),
    /// Body was neither HTML nor a JSON error; holds an excerpt of it.
    Unrecognized(String),
}

/// Why a token exchange was rejected, with what to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub grant: Grant,
    pub status: u16,
    pub kind: AuthFailureKind,
    pub description: Option<String>,
}

impl AuthFailure {
    /// Provider error code, when the provider sent one.
    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            AuthFailureKind::InvalidClient => Some("invalid_client"),
            AuthFailureKind::InvalidGrant => Some("invalid_grant"),
            AuthFailureKind::InvalidScope => Some("invalid_scope"),
            AuthFailureKind::Provider(code) => Some(code.as_str()),
            AuthFailureKind::Blocked | AuthFailureKind::Unrecognized(_) => None,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match (&self.kind, self.grant) {
            (AuthFailureKind::Blocked, Grant::Password) => Some(
                "Possible causes:\n  - incorrect client id, client secret, username or password\n  - application not configured correctly in the developer portal\n  - security restrictions on the Netatmo account",
            ),
            (AuthFailureKind::Blocked, Grant::Refresh) => None,
            (AuthFailureKind::InvalidClient, _) => Some(
                "The client id or client secret is incorrect. Check on https://dev.netatmo.com/ that both match your application exactly and that the .env file has no stray whitespace.",
            ),
            (AuthFailureKind::InvalidGrant, Grant::Password) => Some(
                "The username or password is incorrect, or the password grant type is not enabled for this application.",
            ),
            (AuthFailureKind::InvalidGrant, Grant::Refresh) => {
                Some("The refresh token is invalid or expired. A full authentication is required.")
            }
            (AuthFailureKind::InvalidScope, _) => Some(
                "The requested scope is not allowed for this application. Check in the developer portal that it has access to the Energy API.",
            ),
            (AuthFailureKind::Provider(_), _) | (AuthFailureKind::Unrecognized(_), _) => None,
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed (HTTP {})", self.grant, self.status)?;
        match &self.kind {
            AuthFailureKind::Blocked => write!(f, ": the request was blocked by Netatmo")?,
            AuthFailureKind::Unrecognized(text) if text.is_empty() => {}
            AuthFailureKind::Unrecognized(text) => write!(f, ": {}", text)?,
            _ => {
                if let Some(code) = self.code() {
                    write!(f, ": {}", code)?;
                }
            }
        }
        if let Some(hint) = self.hint() {
            write!(f, "\n{}", hint)?;
        }
        if let Some(description) = &self.description {
            write!(f, "\nDescription: {}", description)?;
        }
        Ok(())
    }
}

/// Classify a non-success token endpoint response.
pub fn interpret_failure(grant: Grant, response: &HttpResponse) -> AuthFailure {
    let status = response.status.as_u16();
    if response.is_html() {
        return AuthFailure {
            grant,
            status,
            kind: AuthFailureKind::Blocked,
            description: None,
        };
    }

    let parsed = serde_json::from_str::<Value>(&response.body).ok();
    let error_description = parsed
        .as_ref()
        .and_then(|v| v.get("error_description"))
        .and_then(Value::as_str)
        .map(str::to_string);
    // `error` is either a bare code or `{code, message}`.
    let found = parsed.as_ref().and_then(|v| v.get("error")).and_then(|e| match e {
        Value::String(s) => Some((s.clone(), None)),
        Value::Object(o) => {
            let message = o.get("message").and_then(Value::as_str).map(str::to_string);
            let code = match o.get("code") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            match (code, message) {
                (Some(code), message) => Some((code, message)),
                (None, Some(message)) => Some((message, None)),
                (None, None) => None,
            }
        }
        _ => None,
    });

    match found {
        Some((code, message)) => {
            let description = error_description.or(message);
            let kind = match code.as_str() {
                "invalid_client" => AuthFailureKind::InvalidClient,
                "invalid_grant" => AuthFailureKind::InvalidGrant,
                "invalid_scope" => AuthFailureKind::InvalidScope,
                _ => AuthFailureKind::Provider(code),
            };
            AuthFailure {
                grant,
                status,
                kind,
                description,
            }
        }
        None => AuthFailure {
            grant,
            status,
            kind: AuthFailureKind::Unrecognized(excerpt(&response.body)),
            description: None,
        },
    }
}

#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Owns the credential store and performs the token exchanges.
#[derive(Debug)]
pub struct Authenticator {
    token_url: String,
    app: AppCredentials,
    user: Option<UserCredentials>,
    store: CredentialStore,
}

impl Authenticator {
    pub fn new(
        token_url: impl Into<String>,
        app: AppCredentials,
        user: Option<UserCredentials>,
        refresh_token: Option<String>,
    ) -> Self {
        Authenticator {
            token_url: token_url.into(),
            app,
            user,
            store: CredentialStore::new(refresh_token),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore {
        &mut self.store
    }

    /// Returns a usable access token, exchanging credentials only when needed.
    pub fn ensure_token(&mut self, transport: &dyn Transport, now: DateTime<Utc>) -> Result<String, ClientError> {
        let state = self.store.state(now);
        debug!("Credential state: {:?}", state);

        let mut refresh_error = None;
        match state {
            CredentialState::Valid => {
                if let Some(token) = self.store.current(now) {
                    return Ok(token.to_string());
                }
            }
            CredentialState::Seeded | CredentialState::Refreshable => match self.refresh_grant(transport, now) {
                Ok(token) => return Ok(token),
                Err(e) => {
                    warn!("Refresh token rejected, falling back to password authentication: {}", e);
                    refresh_error = Some(e);
                }
            },
            CredentialState::Unauthenticated | CredentialState::Stale => {}
        }

        match self.user.clone() {
            Some(user) => self.password_grant(transport, &user, now),
            // Refresh-token-only configuration: nothing left to fall back to.
            None => match refresh_error {
                Some(e) => Err(e),
                None if self.store.refresh_token().is_some() => self.refresh_grant(transport, now),
                None => Err(ClientError::Configuration(
                    "no username/password configured and no usable refresh token".to_string(),
                )),
            },
        }
    }

    fn refresh_grant(&mut self, transport: &dyn Transport, now: DateTime<Utc>) -> Result<String, ClientError> {
        let refresh_token = self
            .store
            .refresh_token()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Configuration("no refresh token available".to_string()))?;

        debug!("Requesting token with refresh grant");
        let request = self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
        ]);
        let response = transport.send(&request)?;
        self.accept(Grant::Refresh, response, now)
    }

    fn password_grant(
        &mut self,
        transport: &dyn Transport,
        user: &UserCredentials,
        now: DateTime<Utc>,
    ) -> Result<String, ClientError> {
        debug!("Requesting token with password grant (no scope)");
        let mut response = transport.send(&self.password_request(user, None))?;

        if !response.status.is_success() {
            for scope in SCOPE_CANDIDATES {
                debug!(
                    "Password grant returned HTTP {}, retrying with scope \"{}\"",
                    response.status.as_u16(),
                    scope
                );
                response = transport.send(&self.password_request(user, Some(scope)))?;
                if response.status.is_success() {
                    break;
                }
            }
        }

        self.accept(Grant::Password, response, now)
    }

    fn password_request(&self, user: &UserCredentials, scope: Option<&str>) -> HttpRequest {
        let mut fields = vec![
            ("grant_type", "password"),
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
            ("username", user.username.as_str()),
            ("password", user.password.as_str()),
        ];
        if let Some(scope) = scope {
            fields.push(("scope", scope));
        }
        self.token_request(&fields)
    }

    fn token_request(&self, fields: &[(&str, &str)]) -> HttpRequest {
        HttpRequest::new(Method::POST, self.token_url.as_str())
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .form(fields)
    }

    fn accept(&mut self, grant: Grant, response: HttpResponse, now: DateTime<Utc>) -> Result<String, ClientError> {
        if !response.status.is_success() {
            return Err(ClientError::Authentication(interpret_failure(grant, &response)));
        }

        let TokenResponse {
            access_token,
            refresh_token,
            expires_in,
        } = decode_json(&response.body, "token response")?;

        let rotated = refresh_token.is_some();
        self.store.update(
            access_token.clone(),
            refresh_token,
            expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            now,
        )?;
        info!(
            "Obtained access token via {} (expires at {}{})",
            grant,
            self.store
                .expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            if rotated { ", new refresh token issued" } else { "" }
        );
        Ok(access_token)
    }
}
