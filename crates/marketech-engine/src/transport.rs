use anyhow::{Context, Result};
use marketech_contracts::config::{BypassHeader, ClientConfig};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::error::truncate_text;

/// Raw HTTP answer. Non-2xx statuses are still `Ok` at the transport layer;
/// only failures to complete the exchange are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("response body is not valid JSON")
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|value| value.trim().to_ascii_lowercase().starts_with("text/html"))
            .unwrap_or(false)
    }

    /// Short body excerpt for error messages.
    pub fn body_snippet(&self) -> String {
        truncate_text(String::from_utf8_lossy(&self.body).trim(), 512)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Transport-neutral multipart body: ordered text fields plus at most one
/// file attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPayload {
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl FormPayload {
    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    pub fn attach(mut self, part: FilePart) -> Self {
        self.file = Some(part);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// The only way the engine talks to the network.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<TransportResponse>;
    fn post_form(&self, url: &str, form: &FormPayload) -> Result<TransportResponse>;
}

/// Blocking reqwest transport. Every request carries the tunnel bypass
/// header.
pub struct HttpTransport {
    http: HttpClient,
    bypass: BypassHeader,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            http,
            bypass: config.bypass_header.clone(),
        })
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<TransportResponse> {
        let response = request
            .header(self.bypass.name.as_str(), self.bypass.value.as_str())
            .send()
            .with_context(|| format!("request failed ({url})"))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .with_context(|| format!("failed reading response body ({url})"))?
            .to_vec();
        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        self.send(self.http.get(url), url)
    }

    fn post_form(&self, url: &str, form: &FormPayload) -> Result<TransportResponse> {
        let mut multipart = MultipartForm::new();
        for (name, value) in &form.fields {
            multipart = multipart.text(name.clone(), value.clone());
        }
        if let Some(file) = &form.file {
            let part = MultipartPart::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime_type)
                .with_context(|| format!("invalid attachment MIME type {}", file.mime_type))?;
            multipart = multipart.part(file.field.clone(), part);
        }
        self.send(self.http.post(url).multipart(multipart), url)
    }
}
