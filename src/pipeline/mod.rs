pub mod orchestrator;
pub mod state;

pub use orchestrator::{Pipeline, PipelineRequest, PipelineResponse, PipelineRun};
pub use state::{FailureKind, PipelineState, StateTrace};
