//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::transport::{FormPayload, Transport, TransportResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub form: Option<FormPayload>,
}

type Scripted = Result<TransportResponse, String>;

struct Route {
    method: Method,
    url_suffix: String,
    replies: VecDeque<Scripted>,
}

/// Replays canned replies per route; the last reply of a route repeats.
/// Every call is recorded, including unmatched ones.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

pub fn json_response(status: u16, body: &str) -> TransportResponse {
    TransportResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: body.as_bytes().to_vec(),
    }
}

pub fn bytes_response(status: u16, content_type: &str, body: &[u8]) -> TransportResponse {
    TransportResponse {
        status,
        content_type: Some(content_type.to_string()),
        body: body.to_vec(),
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(self, method: Method, url_suffix: &str, replies: Vec<Scripted>) -> Self {
        self.routes.lock().unwrap().push(Route {
            method,
            url_suffix: url_suffix.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn on_get(self, url_suffix: &str, response: TransportResponse) -> Self {
        self.route(Method::Get, url_suffix, vec![Ok(response)])
    }

    pub fn on_get_json(self, url_suffix: &str, status: u16, body: &str) -> Self {
        self.on_get(url_suffix, json_response(status, body))
    }

    pub fn on_get_sequence(self, url_suffix: &str, responses: Vec<TransportResponse>) -> Self {
        self.route(
            Method::Get,
            url_suffix,
            responses.into_iter().map(Ok).collect(),
        )
    }

    pub fn on_get_failure(self, url_suffix: &str, message: &str) -> Self {
        self.route(Method::Get, url_suffix, vec![Err(message.to_string())])
    }

    pub fn on_post_json(self, url_suffix: &str, status: u16, body: &str) -> Self {
        self.route(Method::Post, url_suffix, vec![Ok(json_response(status, body))])
    }

    pub fn on_post_failure(self, url_suffix: &str, message: &str) -> Self {
        self.route(Method::Post, url_suffix, vec![Err(message.to_string())])
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|call| call.url == url).count()
    }

    pub fn posts(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == Method::Post)
            .collect()
    }

    fn reply(&self, method: Method, url: &str, form: Option<&FormPayload>) -> Result<TransportResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            url: url.to_string(),
            form: form.cloned(),
        });
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == method && url.ends_with(&route.url_suffix))
        else {
            bail!("no scripted reply for {method:?} {url}");
        };
        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => bail!("{message}"),
            None => bail!("scripted route for {url} has no replies"),
        }
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        self.reply(Method::Get, url, None)
    }

    fn post_form(&self, url: &str, form: &FormPayload) -> Result<TransportResponse> {
        self.reply(Method::Post, url, Some(form))
    }
}
