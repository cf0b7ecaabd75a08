mod request;
mod status;

pub use request::{JobHandle, JobRequest, ReferenceImage, MAX_VARIATIONS, MIN_VARIATIONS};
pub use status::{JobStage, JobStatus, LogEvent};
