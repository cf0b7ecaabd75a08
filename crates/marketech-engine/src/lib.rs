pub mod blobs;
pub mod cancel;
pub mod error;
pub mod health;
pub mod normalizer;
pub mod orchestrator;
pub mod poller;
pub mod resolver;
pub mod submit;
pub mod transport;

#[cfg(test)]
mod testing;

pub use blobs::BlobStore;
pub use cancel::CancelToken;
pub use error::EngineError;
pub use health::{HealthProber, HealthReport};
pub use normalizer::{normalize, NormalizedResults, SkippedResult};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use poller::JobPoller;
pub use resolver::ResourceResolver;
pub use submit::JobSubmitter;
pub use transport::{FilePart, FormPayload, HttpTransport, Transport, TransportResponse};
