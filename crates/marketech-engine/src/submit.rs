use marketech_contracts::config::ClientConfig;
use marketech_contracts::jobs::{JobHandle, JobRequest};
use serde_json::Value;

use crate::error::{error_chain_text, EngineError};
use crate::transport::{FilePart, FormPayload, Transport};

/// Starts a remote job with `POST /api/v1/generate-async`.
pub struct JobSubmitter<'a> {
    config: &'a ClientConfig,
    transport: &'a dyn Transport,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(config: &'a ClientConfig, transport: &'a dyn Transport) -> Self {
        Self { config, transport }
    }

    /// Maps the request onto the backend's multipart schema.
    pub fn build_form(&self, request: &JobRequest) -> FormPayload {
        let mut form = FormPayload::default();
        if let Some(image) = &request.reference_image {
            form = form.attach(FilePart {
                field: "image".to_string(),
                file_name: image.file_name(),
                mime_type: image.mime_type.clone(),
                bytes: image.bytes.clone(),
            });
        }
        form.text("prompt", request.prompt.clone())
            .text("brand_guidelines", request.brand_guidelines())
            .text("variations", request.variation_count.to_string())
            .text("aspect_ratio", self.config.aspect_ratio.clone())
    }

    pub fn submit(&self, request: &JobRequest) -> Result<JobHandle, EngineError> {
        request.validate().map_err(EngineError::submission)?;
        self.send(&self.build_form(request))
    }

    /// Posts an already built form and reads the job id from the answer.
    pub fn send(&self, form: &FormPayload) -> Result<JobHandle, EngineError> {
        let endpoint = self.config.generate_url();
        let response = self
            .transport
            .post_form(&endpoint, form)
            .map_err(|err| EngineError::submission(error_chain_text(&err, 512)))?;
        if !response.is_success() {
            return Err(EngineError::submission(format!(
                "upload failed ({}): {}",
                response.status,
                response.body_snippet()
            )));
        }
        let payload = response
            .json()
            .map_err(|err| EngineError::submission(error_chain_text(&err, 512)))?;
        extract_job_id(&payload)
            .map(JobHandle::new)
            .ok_or_else(|| EngineError::submission("server response is missing job_id"))
    }
}

fn extract_job_id(payload: &Value) -> Option<String> {
    match payload.get("job_id")? {
        Value::String(raw) => Some(raw.trim().to_string()).filter(|value| !value.is_empty()),
        Value::Number(raw) => Some(raw.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use marketech_contracts::jobs::ReferenceImage;

    use crate::testing::ScriptedTransport;

    use super::*;

    fn request() -> JobRequest {
        JobRequest::new("red sneaker on marble")
            .with_reference_image(ReferenceImage::from_bytes(b"img".to_vec(), Some("image/jpeg")))
            .with_style_modifier("Macro close-up shot, focus on texture")
            .with_variation_count(3)
    }

    #[test]
    fn form_uses_backend_field_names() {
        let config = ClientConfig::default();
        let transport = ScriptedTransport::new();
        let form = JobSubmitter::new(&config, &transport).build_form(&request());

        assert_eq!(form.field("prompt"), Some("red sneaker on marble"));
        assert_eq!(
            form.field("brand_guidelines"),
            Some("Camera Angle: Macro close-up shot, focus on texture. Style: Premium and Creative.")
        );
        assert_eq!(form.field("variations"), Some("3"));
        assert_eq!(form.field("aspect_ratio"), Some("1:1"));

        let file = form.file.as_ref().map(|file| (file.field.as_str(), file.file_name.as_str()));
        assert_eq!(file, Some(("image", "input_image.jpg")));
    }

    #[test]
    fn form_without_reference_image_has_no_attachment() {
        let config = ClientConfig::default();
        let transport = ScriptedTransport::new();
        let form = JobSubmitter::new(&config, &transport).build_form(&JobRequest::new("shoe"));
        assert!(form.file.is_none());
        assert_eq!(form.field("variations"), Some("1"));
    }

    #[test]
    fn successful_submit_returns_job_handle() -> anyhow::Result<()> {
        let config = ClientConfig::default();
        let transport = ScriptedTransport::new().on_post_json(
            "/api/v1/generate-async",
            200,
            r#"{"job_id": "job-42"}"#,
        );
        let handle = JobSubmitter::new(&config, &transport).submit(&request())?;
        assert_eq!(handle.as_str(), "job-42");

        let posts = transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "http://localhost:8001/api/v1/generate-async");
        let form = posts[0].form.as_ref();
        assert_eq!(form.and_then(|form| form.field("variations")), Some("3"));
        assert_eq!(
            form.and_then(|form| form.file.as_ref()).map(|file| file.bytes.as_slice()),
            Some(b"img".as_slice())
        );
        Ok(())
    }

    #[test]
    fn empty_prompt_is_rejected_without_network() {
        let config = ClientConfig::default();
        let transport = ScriptedTransport::new();
        let err = JobSubmitter::new(&config, &transport)
            .submit(&JobRequest::new("  "))
            .err();
        assert!(matches!(err, Some(EngineError::Submission { .. })));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn server_rejection_is_a_submission_error() {
        let config = ClientConfig::default();
        let transport =
            ScriptedTransport::new().on_post_json("/api/v1/generate-async", 503, "busy");
        let err = JobSubmitter::new(&config, &transport).submit(&request()).err();
        match err {
            Some(EngineError::Submission { message }) => {
                assert!(message.contains("503"), "{message}");
                assert!(message.contains("busy"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn network_failure_is_a_submission_error() {
        let config = ClientConfig::default();
        let transport =
            ScriptedTransport::new().on_post_failure("/api/v1/generate-async", "connection reset");
        let err = JobSubmitter::new(&config, &transport).submit(&request()).err();
        let message = err.map(|err| err.to_string()).unwrap_or_default();
        assert!(message.starts_with("failed to start generation job"), "{message}");
        assert!(message.contains("connection reset"), "{message}");
    }

    #[test]
    fn missing_job_id_is_a_submission_error() {
        let config = ClientConfig::default();
        for body in [r#"{"id": "x"}"#, r#"{"job_id": ""}"#, r#"{"job_id": null}"#] {
            let transport =
                ScriptedTransport::new().on_post_json("/api/v1/generate-async", 200, body);
            let err = JobSubmitter::new(&config, &transport).submit(&request()).err();
            assert!(matches!(err, Some(EngineError::Submission { .. })), "{body}");
        }
    }

    #[test]
    fn numeric_job_id_is_accepted() -> anyhow::Result<()> {
        let config = ClientConfig::default();
        let transport =
            ScriptedTransport::new().on_post_json("/api/v1/generate-async", 201, r#"{"job_id": 7}"#);
        let handle = JobSubmitter::new(&config, &transport).submit(&request())?;
        assert_eq!(handle.as_str(), "7");
        Ok(())
    }
}
