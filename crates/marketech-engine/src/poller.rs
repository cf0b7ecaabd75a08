use std::time::Instant;

use marketech_contracts::config::ClientConfig;
use marketech_contracts::jobs::{JobHandle, JobStage, JobStatus};

use crate::cancel::CancelToken;
use crate::error::{error_chain_text, EngineError};
use crate::transport::Transport;

pub const UNKNOWN_BACKEND_ERROR: &str = "Unknown backend error";

/// Polls `GET /api/v1/jobs/{job_id}` until the server reports `DONE` or
/// `ERROR`.
///
/// Each snapshot goes to the callback before the next poll is scheduled. A
/// failed status request ends the run; it is not retried.
pub struct JobPoller<'a> {
    config: &'a ClientConfig,
    transport: &'a dyn Transport,
    cancel: &'a CancelToken,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        config: &'a ClientConfig,
        transport: &'a dyn Transport,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            config,
            transport,
            cancel,
        }
    }

    pub fn poll_until_terminal(
        &self,
        handle: &JobHandle,
        on_status: &mut dyn FnMut(&JobStatus),
    ) -> Result<JobStatus, EngineError> {
        let started = Instant::now();
        let mut polls: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(cancelled(handle));
            }
            let out_of_polls = self.config.max_polls.is_some_and(|max| polls >= max);
            let past_deadline = self
                .config
                .poll_deadline
                .is_some_and(|deadline| started.elapsed() >= deadline);
            if out_of_polls || past_deadline {
                return Err(EngineError::Timeout {
                    job_id: handle.job_id.clone(),
                    polls,
                    elapsed: started.elapsed(),
                });
            }

            polls += 1;
            let status = self.fetch_status(handle)?;
            on_status(&status);

            match status.stage {
                JobStage::Done => return Ok(status),
                JobStage::Error => {
                    let message = status
                        .error
                        .as_deref()
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .unwrap_or(UNKNOWN_BACKEND_ERROR)
                        .to_string();
                    return Err(EngineError::JobFailed {
                        job_id: handle.job_id.clone(),
                        message,
                        trace: status.trace,
                    });
                }
                _ => {}
            }

            if !self.cancel.sleep(self.config.poll_interval) {
                return Err(cancelled(handle));
            }
        }
    }

    fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, EngineError> {
        let poll_error = |message: String| EngineError::PollTransport {
            job_id: handle.job_id.clone(),
            message,
        };
        let url = self.config.job_url(&handle.job_id);
        let response = self
            .transport
            .get(&url)
            .map_err(|err| poll_error(error_chain_text(&err, 512)))?;
        if !response.is_success() {
            return Err(poll_error(format!(
                "status request returned {}: {}",
                response.status,
                response.body_snippet()
            )));
        }
        serde_json::from_slice::<JobStatus>(&response.body)
            .map_err(|err| poll_error(format!("invalid job status payload: {err}")))
    }
}

fn cancelled(handle: &JobHandle) -> EngineError {
    EngineError::Cancelled {
        job_id: Some(handle.job_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::testing::{json_response, ScriptedTransport};

    use super::*;

    fn fast_config() -> ClientConfig {
        let mut config = ClientConfig::new("http://localhost:8001");
        config.poll_interval = Duration::from_millis(1);
        config
    }

    fn poll(
        config: &ClientConfig,
        transport: &ScriptedTransport,
        cancel: &CancelToken,
    ) -> (Result<JobStatus, EngineError>, Vec<JobStatus>) {
        let mut seen = Vec::new();
        let result = JobPoller::new(config, transport, cancel)
            .poll_until_terminal(&JobHandle::new("job-1"), &mut |status| {
                seen.push(status.clone())
            });
        (result, seen)
    }

    #[test]
    fn reports_every_snapshot_until_done() -> anyhow::Result<()> {
        let config = fast_config();
        let transport = ScriptedTransport::new().on_get_sequence(
            "/api/v1/jobs/job-1",
            vec![
                json_response(200, r#"{"stage":"IMAGE_POLL","progress":30,"events":["queued"]}"#),
                json_response(200, r#"{"stage":"IMAGE_POLL","progress":60,"events":["queued"]}"#),
                json_response(200, r#"{"stage":"DONE","progress":100,"results":["a.png"]}"#),
            ],
        );
        let (result, seen) = poll(&config, &transport, &CancelToken::new());

        let done = result?;
        assert_eq!(done.stage, JobStage::Done);
        assert_eq!(
            seen.iter().map(|status| status.progress).collect::<Vec<_>>(),
            vec![30.0, 60.0, 100.0]
        );
        assert_eq!(transport.calls_to("http://localhost:8001/api/v1/jobs/job-1"), 3);
        Ok(())
    }

    #[test]
    fn error_stage_carries_server_message() {
        let config = fast_config();
        let transport = ScriptedTransport::new().on_get_json(
            "/api/v1/jobs/job-1",
            200,
            r#"{"stage":"ERROR","progress":40,"events":[],"error":"capacity exceeded","trace":"tb"}"#,
        );
        let (result, seen) = poll(&config, &transport, &CancelToken::new());
        assert_eq!(seen.len(), 1);
        match result {
            Err(EngineError::JobFailed { message, trace, .. }) => {
                assert_eq!(message, "capacity exceeded");
                assert_eq!(trace.as_deref(), Some("tb"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn error_stage_without_text_uses_generic_message() {
        let config = fast_config();
        let transport = ScriptedTransport::new().on_get_json(
            "/api/v1/jobs/job-1",
            200,
            r#"{"stage":"ERROR","progress":0,"events":[]}"#,
        );
        let (result, _) = poll(&config, &transport, &CancelToken::new());
        let message = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(message, UNKNOWN_BACKEND_ERROR);
    }

    #[test]
    fn transport_failure_is_fatal_and_not_retried() {
        let config = fast_config();
        let transport =
            ScriptedTransport::new().on_get_failure("/api/v1/jobs/job-1", "connection reset");
        let (result, seen) = poll(&config, &transport, &CancelToken::new());
        assert!(matches!(result, Err(EngineError::PollTransport { .. })));
        assert!(seen.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn non_success_status_is_a_poll_failure() {
        let config = fast_config();
        let transport = ScriptedTransport::new().on_get_sequence(
            "/api/v1/jobs/job-1",
            vec![
                json_response(200, r#"{"stage":"LLM_PATCHES","progress":10}"#),
                json_response(500, "boom"),
            ],
        );
        let (result, seen) = poll(&config, &transport, &CancelToken::new());
        assert_eq!(seen.len(), 1);
        let message = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert!(message.contains("500"), "{message}");
    }

    #[test]
    fn undecodable_payload_is_a_poll_failure() {
        let config = fast_config();
        let transport =
            ScriptedTransport::new().on_get_json("/api/v1/jobs/job-1", 200, "<html>warning</html>");
        let (result, _) = poll(&config, &transport, &CancelToken::new());
        assert!(matches!(result, Err(EngineError::PollTransport { .. })));
    }

    #[test]
    fn max_polls_bounds_the_loop() {
        let mut config = fast_config();
        config.max_polls = Some(3);
        let transport = ScriptedTransport::new().on_get_json(
            "/api/v1/jobs/job-1",
            200,
            r#"{"stage":"IMAGE_POLL","progress":50}"#,
        );
        let (result, seen) = poll(&config, &transport, &CancelToken::new());
        assert_eq!(seen.len(), 3);
        assert!(matches!(result, Err(EngineError::Timeout { polls: 3, .. })));
    }

    #[test]
    fn poll_deadline_bounds_the_loop() {
        let mut config = fast_config();
        config.poll_interval = Duration::from_millis(20);
        config.poll_deadline = Some(Duration::from_millis(50));
        let transport = ScriptedTransport::new().on_get_json(
            "/api/v1/jobs/job-1",
            200,
            r#"{"stage":"LLM_PATCHES","progress":15}"#,
        );
        let (result, seen) = poll(&config, &transport, &CancelToken::new());
        match result {
            Err(EngineError::Timeout { job_id, polls, elapsed }) => {
                assert_eq!(job_id, "job-1");
                assert!(polls >= 1);
                assert_eq!(polls as usize, seen.len());
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn cancelled_token_stops_before_first_poll() {
        let config = fast_config();
        let transport = ScriptedTransport::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (result, _) = poll(&config, &transport, &cancel);
        assert!(matches!(result, Err(EngineError::Cancelled { .. })));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn callback_can_cancel_between_polls() {
        let config = fast_config();
        let transport = ScriptedTransport::new().on_get_json(
            "/api/v1/jobs/job-1",
            200,
            r#"{"stage":"IMAGE_POLL","progress":50}"#,
        );
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let result = JobPoller::new(&config, &transport, &cancel)
            .poll_until_terminal(&JobHandle::new("job-1"), &mut |_| remote.cancel());
        assert!(matches!(result, Err(EngineError::Cancelled { .. })));
        assert_eq!(transport.calls().len(), 1);
    }
}
