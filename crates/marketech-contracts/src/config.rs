use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:8001";
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_TUNNEL_SUFFIXES: &[&str] = &[
    "ngrok-free.app",
    "ngrok-free.dev",
    "ngrok.app",
    "ngrok.dev",
    "ngrok.io",
];

/// Header that stops tunnel proxies from answering with an HTML warning
/// page instead of the backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassHeader {
    pub name: String,
    pub value: String,
}

impl Default for BypassHeader {
    fn default() -> Self {
        Self {
            name: "ngrok-skip-browser-warning".to_string(),
            value: "1".to_string(),
        }
    }
}

/// Immutable client settings, fixed when the orchestrator is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    base_url: String,
    pub bypass_header: BypassHeader,
    pub tunnel_host_suffixes: Vec<String>,
    pub poll_interval: Duration,
    /// `None` polls until the server reports a terminal stage.
    pub max_polls: Option<u32>,
    pub poll_deadline: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub aspect_ratio: String,
    pub blob_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            bypass_header: BypassHeader::default(),
            tunnel_host_suffixes: DEFAULT_TUNNEL_SUFFIXES
                .iter()
                .map(|suffix| (*suffix).to_string())
                .collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
            poll_deadline: None,
            request_timeout: None,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            blob_dir: env::temp_dir().join("marketech-blobs"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from `MARKETECH_*` variables supplied by `lookup`.
    /// Blank values are ignored and numbers are clamped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::new(
            read("MARKETECH_API_BASE")
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE),
        );
        let read_f64 = |key: &str| read(key).and_then(|raw| raw.parse::<f64>().ok());
        if let Some(seconds) = read_f64("MARKETECH_POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs_f64(seconds.clamp(0.05, 30.0));
        }
        if let Some(polls) = read("MARKETECH_MAX_POLLS").and_then(|raw| raw.parse::<u32>().ok()) {
            config.max_polls = Some(polls.max(1));
        }
        if let Some(seconds) = read_f64("MARKETECH_POLL_DEADLINE") {
            config.poll_deadline = Some(Duration::from_secs_f64(seconds.clamp(1.0, 86_400.0)));
        }
        if let Some(seconds) = read_f64("MARKETECH_REQUEST_TIMEOUT") {
            config.request_timeout = Some(Duration::from_secs_f64(seconds.clamp(1.0, 600.0)));
        }
        if let Some(dir) = read("MARKETECH_BLOB_DIR") {
            config.blob_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/v1/generate-async", self.base_url)
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/api/v1/jobs/{}", self.base_url, job_id)
    }

    /// Joins a server-relative path onto the base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim().trim_start_matches('/'))
    }

    /// True when `url` points at the backend itself, a local host, or a
    /// known tunnel domain, i.e. where the bypass header is meaningful.
    pub fn is_backend_url(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        if host == "localhost" || host == "127.0.0.1" {
            return true;
        }
        if host_of(&self.base_url).as_deref() == Some(host.as_str()) {
            return true;
        }
        self.tunnel_host_suffixes.iter().any(|suffix| {
            let suffix = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
            !suffix.is_empty() && (host == suffix || host.ends_with(&format!(".{suffix}")))
        })
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE.to_string();
    }
    trimmed.to_string()
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
}
