pub mod audit;
pub mod cluster;
pub mod config;
pub mod error;
pub mod error_translation;
pub mod llm;
pub mod pipeline;
pub mod policy;
pub mod security;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult};
pub use pipeline::{Pipeline, PipelineRequest, PipelineResponse};
pub use policy::Policy;
pub use security::{ApprovedCommand, CandidateCommand, Critic, Verdict};
