//! HTTP client for the Netatmo Energy API (thermostat subset).
//!
//! - Blocking, through a [`Transport`] (`ureq` in production).
//! - One client is one session: it owns the credential state and repairs an
//!   expired token before every call.
//! - Business requests are never retried; only authentication falls back.

use chrono::{DateTime, Utc};
use http::Method;
use log::debug;
use serde_json::{Value, json};
use std::cell::RefCell;

use crate::auth::{AppCredentials, AuthFailure, Authenticator, USER_AGENT, UserCredentials};
use crate::config::Config;
use crate::models::netatmo::*;
use crate::transport::{HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::utils::{debug_payload, decode_value, excerpt};

/// How much of a topology payload `--debug` shows.
const TOPOLOGY_DUMP_CHARS: usize = 2000;
/// How much of a `getmeasure` payload `--debug` shows.
const MEASURE_DUMP_CHARS: usize = 3000;

pub const TOKEN_PATH: &str = "/oauth2/token";

#[derive(Debug)]
pub enum ClientError {
    /// Required settings absent; raised before any network activity.
    Configuration(String),
    /// Every authentication strategy failed.
    Authentication(AuthFailure),
    /// Non-success answer to an authenticated call.
    Api {
        status: u16,
        provider_error: Option<String>,
        message: String,
    },
    NotFound(String),
    MalformedResponse(String),
    Transport(String),
}

impl core::fmt::Display for ClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClientError::Configuration(s) => write!(f, "configuration error: {}", s),
            ClientError::Authentication(e) => write!(f, "{}", e),
            ClientError::Api {
                status,
                provider_error,
                message,
            } => {
                write!(f, "api error (HTTP {})", status)?;
                match (provider_error, message.is_empty()) {
                    (Some(code), false) => write!(f, ": {} - {}", code, message),
                    (Some(code), true) => write!(f, ": {}", code),
                    (None, false) => write!(f, ": {}", message),
                    (None, true) => Ok(()),
                }
            }
            ClientError::NotFound(s) => write!(f, "not found: {}", s),
            ClientError::MalformedResponse(s) => write!(f, "malformed response: {}", s),
            ClientError::Transport(s) => write!(f, "transport error: {}", s),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<AuthFailure> for ClientError {
    fn from(value: AuthFailure) -> Self {
        ClientError::Authentication(value)
    }
}

/// Turn a non-success API response into [`ClientError::Api`].
///
/// Understands `{"error": "code", "error_description": "..."}` and
/// `{"error": {"code": 13, "message": "..."}}`; anything else is reported as
/// a short excerpt of the body.
pub fn api_error(response: &HttpResponse) -> ClientError {
    let status = response.status.as_u16();
    let parsed = serde_json::from_str::<Value>(&response.body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let (provider_error, message) = match error {
        Some(Value::String(code)) => {
            let description = parsed
                .as_ref()
                .and_then(|v| v.get("error_description"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            (Some(code.clone()), description.to_string())
        }
        Some(Value::Object(obj)) => {
            let code = obj.get("code").map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            let message = obj.get("message").and_then(Value::as_str).unwrap_or_default();
            (code, message.to_string())
        }
        _ => (None, excerpt(&response.body)),
    };

    ClientError::Api {
        status,
        provider_error,
        message,
    }
}

pub struct NetatmoClient<T: Transport = UreqTransport> {
    transport: T,
    api_url: String,
    auth: RefCell<Authenticator>,
    clock: fn() -> DateTime<Utc>,
}

impl NetatmoClient<UreqTransport> {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> NetatmoClient<T> {
    /// Validates the configuration eagerly; no request is made here.
    pub fn with_transport(config: &Config, transport: T) -> Result<Self, ClientError> {
        config.validate()?;

        let app = AppCredentials {
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
        };
        let user = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(UserCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let auth = Authenticator::new(
            format!("{}{}", config.api_url, TOKEN_PATH),
            app,
            user,
            config.refresh_token.clone(),
        );

        Ok(NetatmoClient {
            transport,
            api_url: config.api_url.clone(),
            auth: RefCell::new(auth),
            clock: Utc::now,
        })
    }

    /// Replace the wall clock, for deterministic expiry handling.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current refresh token, possibly rotated by the provider during this session.
    pub fn refresh_token(&self) -> Option<String> {
        self.auth.borrow().store().refresh_token().map(str::to_string)
    }

    pub fn ensure_token(&self) -> Result<String, ClientError> {
        let now = self.now();
        self.auth.borrow_mut().ensure_token(&self.transport, now)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.api_url, path)
        } else {
            format!("{}/{}", self.api_url, path)
        }
    }

    /// Authenticated API call returning the parsed JSON body.
    pub fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let token = self.ensure_token()?;

        let mut request = HttpRequest::new(method, self.url(path))
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .query(params);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{} {}", request.method, request.url);
        let response = self.transport.send(&request)?;
        if !response.status.is_success() {
            let err = api_error(&response);
            debug!("{} {} failed: {}", request.method, path, err);
            return Err(err);
        }

        serde_json::from_str(&response.body).map_err(|e| {
            ClientError::MalformedResponse(format!("{} {}: {} (body: {})", request.method, path, e, excerpt(&response.body)))
        })
    }

    pub fn get_homes_data(&self) -> Result<HomesData, ClientError> {
        let raw = self.call(Method::GET, "/api/homesdata", &[], None)?;
        debug_payload("homesdata response", &raw, Some(TOPOLOGY_DUMP_CHARS));
        decode_value(raw, "homesdata")
    }

    pub fn get_home_status(&self, home_id: &HomeId) -> Result<HomeStatus, ClientError> {
        let raw = self.call(Method::GET, "/api/homestatus", &[("home_id", home_id.0.clone())], None)?;
        debug_payload(&format!("homestatus response for home {}", home_id.0), &raw, Some(TOPOLOGY_DUMP_CHARS));
        decode_value(raw, "homestatus")
    }

    /// Change a room's setpoint. `temperature` is only sent in manual mode.
    pub fn set_thermpoint(
        &self,
        home_id: &HomeId,
        room_id: &RoomId,
        mode: SetpointMode,
        temperature: Option<f64>,
    ) -> Result<Value, ClientError> {
        let mut body = json!({
            "home_id": home_id,
            "room_id": room_id,
            "mode": mode,
        });
        if let (SetpointMode::Manual, Some(temp)) = (mode, temperature) {
            body["temp"] = json!(temp);
        }
        self.call(Method::POST, "/api/setthermpoint", &[], Some(body))
    }

    /// Raw `getmeasure` payload; the body shape varies, see `services::history`.
    pub fn get_measure(
        &self,
        device_id: &ModuleId,
        module_id: &ModuleId,
        scale: &str,
        types: &[&str],
        date_begin: Option<i64>,
        date_end: Option<i64>,
    ) -> Result<Value, ClientError> {
        let mut params = vec![
            ("device_id", device_id.0.clone()),
            ("module_id", module_id.0.clone()),
            ("scale", scale.to_string()),
            ("type", types.join(",")),
        ];
        if let Some(begin) = date_begin {
            params.push(("date_begin", begin.to_string()));
        }
        if let Some(end) = date_end {
            params.push(("date_end", end.to_string()));
        }
        let raw = self.call(Method::GET, "/api/getmeasure", &params, None)?;
        debug_payload("getmeasure response", &raw, Some(MEASURE_DUMP_CHARS));
        Ok(raw)
    }
}
