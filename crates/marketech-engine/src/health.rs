use marketech_contracts::config::ClientConfig;
use serde_json::Value;

use crate::transport::Transport;

/// Liveness check against `GET /health`.
///
/// Never fails: transport errors, non-2xx answers and bodies other than
/// `{"status": "ok"}` all count as unhealthy.
pub struct HealthProber<'a> {
    config: &'a ClientConfig,
    transport: &'a dyn Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub detail: String,
}

impl<'a> HealthProber<'a> {
    pub fn new(config: &'a ClientConfig, transport: &'a dyn Transport) -> Self {
        Self { config, transport }
    }

    pub fn probe(&self) -> bool {
        self.check().healthy
    }

    /// Same as [`probe`](Self::probe) but explains a negative answer.
    pub fn check(&self) -> HealthReport {
        let url = self.config.health_url();
        let response = match self.transport.get(&url) {
            Ok(response) => response,
            Err(err) => return unhealthy(format!("health check network error: {err:#}")),
        };
        if !response.is_success() {
            return unhealthy(format!("health check failed with status {}", response.status));
        }
        let status = response
            .json()
            .ok()
            .and_then(|payload| payload.get("status").and_then(Value::as_str).map(str::to_string));
        match status.as_deref() {
            Some("ok") => HealthReport {
                healthy: true,
                detail: "ok".to_string(),
            },
            Some(other) => unhealthy(format!("health check reported status {other:?}")),
            None => unhealthy(format!(
                "health check returned an unexpected body: {}",
                response.body_snippet()
            )),
        }
    }
}

fn unhealthy(detail: String) -> HealthReport {
    HealthReport {
        healthy: false,
        detail,
    }
}
