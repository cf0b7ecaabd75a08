use std::time::Duration;

/// Terminal failures of a generation run. Each variant carries a message
/// meant to be shown to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("backend at {base_url} is unreachable; check that the tunnel is up and accessible")]
    UnreachableBackend { base_url: String },

    #[error("failed to start generation job: {message}")]
    Submission { message: String },

    #[error("polling job {job_id} failed: {message}")]
    PollTransport { job_id: String, message: String },

    /// The server reported stage `ERROR`; displays the server text verbatim.
    #[error("{message}")]
    JobFailed {
        job_id: String,
        message: String,
        trace: Option<String>,
    },

    #[error("job {job_id} did not finish after {polls} polls ({elapsed:.1?})")]
    Timeout {
        job_id: String,
        polls: u32,
        elapsed: Duration,
    },

    #[error("generation cancelled")]
    Cancelled { job_id: Option<String> },
}

impl EngineError {
    pub(crate) fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::PollTransport { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::Timeout { job_id, .. } => Some(job_id),
            Self::Cancelled { job_id } => job_id.as_deref(),
            _ => None,
        }
    }

    /// Short machine-friendly name used in event logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnreachableBackend { .. } => "unreachable_backend",
            Self::Submission { .. } => "submission",
            Self::PollTransport { .. } => "poll_transport",
            Self::JobFailed { .. } => "job_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
