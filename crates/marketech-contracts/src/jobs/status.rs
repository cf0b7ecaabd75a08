use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Server-reported phase of a job.
///
/// The backend speaks `BRIA_SP_REQUEST`/`LLM_PATCHES`/`IMAGE_POLL`; the
/// descriptive names are accepted as aliases. Anything else is kept verbatim
/// and treated as still running.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStage {
    #[default]
    Requesting,
    Patching,
    PollingImages,
    Done,
    Error,
    Unknown(String),
}

impl JobStage {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BRIA_SP_REQUEST" | "REQUESTING" => Self::Requesting,
            "LLM_PATCHES" | "PATCHING" => Self::Patching,
            "IMAGE_POLL" | "POLLING_IMAGES" => Self::PollingImages,
            "DONE" => Self::Done,
            "ERROR" => Self::Error,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Requesting => "BRIA_SP_REQUEST",
            Self::Patching => "LLM_PATCHES",
            Self::PollingImages => "IMAGE_POLL",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Requesting => "Requesting",
            Self::Patching => "Patching prompt",
            Self::PollingImages => "Rendering images",
            Self::Done => "Done",
            Self::Error => "Error",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl From<String> for JobStage {
    fn from(raw: String) -> Self {
        Self::from_wire(&raw)
    }
}

impl From<JobStage> for String {
    fn from(stage: JobStage) -> Self {
        stage.as_wire().to_string()
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One entry of a job's log: plain text, `{t, msg}`, or anything else the
/// server sends. Unrecognized shapes are kept so they can still be shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogEvent {
    Text(String),
    Entry {
        #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
        t: Option<Value>,
        #[serde(alias = "message")]
        msg: String,
    },
    Other(Value),
}

impl LogEvent {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Entry { msg, .. } if !msg.is_empty() => msg.clone(),
            Self::Entry { .. } => serde_json::to_string(self).unwrap_or_default(),
            Self::Other(value) => value.to_string(),
        }
    }
}

/// A single snapshot returned by `GET /api/v1/jobs/{job_id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub stage: JobStage,
    #[serde(default, deserialize_with = "progress_or_zero")]
    pub progress: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<LogEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl JobStatus {
    /// Client-side status reported before the server has produced one.
    pub fn synthetic(progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage: JobStage::Requesting,
            progress,
            events: vec![LogEvent::message(message)],
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn latest_message(&self) -> Option<String> {
        self.events.last().map(LogEvent::display_text)
    }
}

fn progress_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<LogEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LogEvent>>::deserialize(deserializer)?.unwrap_or_default())
}
