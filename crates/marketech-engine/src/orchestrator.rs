use std::sync::Arc;

use anyhow::Result;
use marketech_contracts::config::ClientConfig;
use marketech_contracts::events::{EventLog, EventPayload};
use marketech_contracts::jobs::{JobHandle, JobRequest, JobStatus};
use marketech_contracts::results::{ResolutionOutcome, ResolvedImage};
use serde_json::{json, Map, Value};

use crate::blobs::BlobStore;
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::health::HealthProber;
use crate::normalizer::normalize;
use crate::poller::JobPoller;
use crate::resolver::ResourceResolver;
use crate::submit::JobSubmitter;
use crate::transport::{HttpTransport, Transport};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub job: JobHandle,
    pub images: Vec<ResolvedImage>,
    pub warnings: Vec<String>,
    pub final_status: JobStatus,
}

/// Drives one generation job: health probe, submission, polling, result
/// resolution. One job at a time per call; the instance itself holds no
/// per-job state.
pub struct Orchestrator {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    blobs: BlobStore,
    events: Option<EventLog>,
}

impl Orchestrator {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let blobs = BlobStore::new(config.blob_dir.clone());
        Self {
            config,
            transport,
            blobs,
            events: None,
        }
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn probe(&self) -> bool {
        HealthProber::new(&self.config, self.transport.as_ref()).probe()
    }

    /// Runs a job to completion and returns the resolved images in server
    /// order. `on_progress` sees synthetic statuses first, then every server
    /// snapshot.
    pub fn run(
        &self,
        request: &JobRequest,
        on_progress: impl FnMut(&JobStatus),
    ) -> Result<Vec<ResolvedImage>, EngineError> {
        self.run_with_cancel(request, on_progress, &CancelToken::new())
            .map(|outcome| outcome.images)
    }

    pub fn run_with_cancel(
        &self,
        request: &JobRequest,
        mut on_progress: impl FnMut(&JobStatus),
        cancel: &CancelToken,
    ) -> Result<RunOutcome, EngineError> {
        let mut warnings = Vec::new();
        self.log(
            &mut warnings,
            "job_started",
            json!({
                "base_url": self.config.base_url(),
                "prompt": request.prompt,
                "variations": request.variation_count,
                "has_image": request.reference_image.is_some(),
            }),
        );

        let result = self.execute(request, &mut on_progress, cancel, &mut warnings);
        if let Err(err) = &result {
            self.log(
                &mut warnings,
                "job_failed",
                json!({
                    "kind": err.kind(),
                    "message": err.to_string(),
                    "job_id": err.job_id(),
                }),
            );
        }
        result
    }

    fn execute(
        &self,
        request: &JobRequest,
        on_progress: &mut dyn FnMut(&JobStatus),
        cancel: &CancelToken,
        warnings: &mut Vec<String>,
    ) -> Result<RunOutcome, EngineError> {
        if request.reference_image.is_none() {
            return Err(EngineError::InvalidRequest(
                "a reference image and a prompt are required".to_string(),
            ));
        }
        request.validate().map_err(EngineError::InvalidRequest)?;

        on_progress(&JobStatus::synthetic(5.0, "Connecting to secure backend..."));
        ensure_active(cancel, None)?;
        let health = HealthProber::new(&self.config, self.transport.as_ref()).check();
        self.log(
            warnings,
            "health_checked",
            json!({"healthy": health.healthy, "detail": health.detail}),
        );
        if !health.healthy {
            return Err(EngineError::UnreachableBackend {
                base_url: self.config.base_url().to_string(),
            });
        }

        on_progress(&JobStatus::synthetic(10.0, "Processing input data..."));
        let submitter = JobSubmitter::new(&self.config, self.transport.as_ref());
        let form = submitter.build_form(request);
        on_progress(&JobStatus::synthetic(20.0, "Sending secure payload..."));
        ensure_active(cancel, None)?;
        let job = submitter.send(&form)?;
        self.log(warnings, "job_submitted", json!({"job_id": job.job_id}));

        let final_status = {
            let mut forward = |status: &JobStatus| {
                if let Some(events) = &self.events {
                    if let Err(err) = events.emit_status(&job.job_id, status) {
                        push_unique_warning(warnings, format!("event log write failed: {err:#}"));
                    }
                }
                on_progress(status);
            };
            JobPoller::new(&self.config, self.transport.as_ref(), cancel)
                .poll_until_terminal(&job, &mut forward)?
        };

        let items = final_status.results.clone().unwrap_or_default();
        let resolver = ResourceResolver::new(&self.config, self.transport.as_ref(), &self.blobs);
        let normalized = normalize(&resolver, &items, &request.prompt);

        for skipped in &normalized.skipped {
            push_unique_warning(
                warnings,
                format!("result #{} skipped: {}", skipped.index, skipped.reason),
            );
            self.log(
                warnings,
                "result_skipped",
                json!({
                    "job_id": job.job_id,
                    "index": skipped.index,
                    "item": skipped.item,
                    "reason": skipped.reason,
                }),
            );
        }
        for image in &normalized.images {
            if let ResolutionOutcome::Degraded { reason } = &image.outcome {
                push_unique_warning(
                    warnings,
                    format!("{} was not fetched ({reason}); using the URL directly", image.source),
                );
                self.log(
                    warnings,
                    "result_degraded",
                    json!({"job_id": job.job_id, "source": image.source, "reason": reason}),
                );
            }
        }

        self.log(
            warnings,
            "job_completed",
            json!({
                "job_id": job.job_id,
                "images": normalized.images.len(),
                "skipped": normalized.skipped.len(),
            }),
        );

        Ok(RunOutcome {
            job,
            images: normalized.images,
            warnings: warnings.clone(),
            final_status,
        })
    }

    fn log(&self, warnings: &mut Vec<String>, event: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.emit(event, map_object(payload)) {
            push_unique_warning(warnings, format!("event log write failed: {err:#}"));
        }
    }
}

fn ensure_active(cancel: &CancelToken, job_id: Option<&str>) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled {
            job_id: job_id.map(str::to_string),
        });
    }
    Ok(())
}

fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_else(Map::new)
}
