pub mod anthropic;
pub mod client;
pub mod generator;
pub mod summarizer;

pub use anthropic::AnthropicClient;
pub use client::{LLMClient, LLMError};
pub use generator::{CommandGenerator, GenerationError};
pub use summarizer::{SummarizationError, Summarizer, SummaryInput};
