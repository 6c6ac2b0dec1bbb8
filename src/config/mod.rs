pub mod settings;

pub use settings::{AuditConfig, Config, ConfigError, ExecutorConfig, LLMConfig, PolicyConfig};
