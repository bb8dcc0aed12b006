//! In-memory transport for unit tests.

use std::cell::RefCell;

use http::{Method, StatusCode};
use serde_json::Value;

use crate::client::ClientError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

type Matcher = Box<dyn Fn(&HttpRequest) -> bool>;

enum Reply {
    Response(HttpResponse),
    Fail(String),
}

struct Route {
    matches: Matcher,
    reply: Reply,
}

/// Records every request and answers from registered routes.
/// Routes registered later take precedence; unmatched requests get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// Requests whose URL ends with `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .cloned()
            .collect()
    }

    pub fn respond_to_form(&self, field: &'static str, value: &'static str, response: HttpResponse) {
        self.route(
            Box::new(move |r| r.form_field(field) == Some(value)),
            Reply::Response(response),
        );
    }

    pub fn fail_form(&self, field: &'static str, value: &'static str, message: &str) {
        self.route(
            Box::new(move |r| r.form_field(field) == Some(value)),
            Reply::Fail(message.to_string()),
        );
    }

    pub fn respond_to(&self, method: Method, path: &'static str, response: HttpResponse) {
        self.route(
            Box::new(move |r| r.method == method && r.url.ends_with(path)),
            Reply::Response(response),
        );
    }

    pub fn respond_to_query(
        &self,
        path: &'static str,
        param: &'static str,
        value: &'static str,
        response: HttpResponse,
    ) {
        self.route(
            Box::new(move |r| r.url.ends_with(path) && r.query_param(param) == Some(value)),
            Reply::Response(response),
        );
    }

    pub fn fail_query(&self, path: &'static str, param: &'static str, value: &'static str, message: &str) {
        self.route(
            Box::new(move |r| r.url.ends_with(path) && r.query_param(param) == Some(value)),
            Reply::Fail(message.to_string()),
        );
    }

    fn route(&self, matches: Matcher, reply: Reply) {
        self.routes.borrow_mut().push(Route { matches, reply });
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.borrow_mut().push(request.clone());
        let routes = self.routes.borrow();
        match routes.iter().rev().find(|route| (route.matches)(request)) {
            Some(Route {
                reply: Reply::Response(response),
                ..
            }) => Ok(response.clone()),
            Some(Route {
                reply: Reply::Fail(message),
                ..
            }) => Err(ClientError::Transport(message.clone())),
            None => Ok(json_response(StatusCode::NOT_FOUND, serde_json::json!({"error": "no route"}))),
        }
    }
}

pub fn json_response(status: StatusCode, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("application/json; charset=utf-8".to_string()),
        body: body.to_string(),
    }
}

pub fn html(status: StatusCode, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("text/html; charset=UTF-8".to_string()),
        body: body.to_string(),
    }
}

pub fn text(status: StatusCode, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("text/plain".to_string()),
        body: body.to_string(),
    }
}
