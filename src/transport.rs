//! Blocking HTTP transport used by the Netatmo client.
//!
//! The client only needs GET and POST with form or JSON bodies, so requests are
//! described by a small owned value and executed through the [`Transport`]
//! trait. [`UreqTransport`] is the production implementation.

use http::{Method, StatusCode};
use serde_json::Value;

use crate::client::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, params: &[(&str, String)]) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Value of a form field, if the body is form-encoded.
    pub fn form_field(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        // Non-2xx statuses are interpreted by the client, not raised by ureq.
        let config = ureq::Agent::config_builder().http_status_as_error(false).build();
        UreqTransport {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        let query = request.query.iter().map(|(k, v)| (k.as_str(), v.as_str()));

        let result = if request.method == Method::GET {
            let mut req = self.agent.get(&request.url).query_pairs(query);
            for (name, value) in &request.headers {
                req = req.header(name.as_str(), value.as_str());
            }
            req.call()
        } else if request.method == Method::POST {
            let mut req = self.agent.post(&request.url).query_pairs(query);
            for (name, value) in &request.headers {
                req = req.header(name.as_str(), value.as_str());
            }
            match &request.body {
                RequestBody::Empty => req.send_empty(),
                RequestBody::Form(fields) => req.send_form(fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
                RequestBody::Json(body) => req.send_json(body),
            }
        } else {
            return Err(ClientError::Transport(format!(
                "unsupported method {} for {}",
                request.method, request.url
            )));
        };

        let mut response = result.map_err(|e| ClientError::Transport(format!("{} {}: {}", request.method, request.url, e)))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ClientError::Transport(format!("reading body from {}: {}", request.url, e)))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
