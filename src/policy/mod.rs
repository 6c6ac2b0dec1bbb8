pub mod store;

pub use store::{Policy, PolicyLoadError, DEFAULT_POLICY};

/// Shell separators and metacharacters that are always forbidden.
///
/// A policy file can extend this list with its own `forbidden_tokens`, but it
/// can never remove an entry from it.
pub const BASELINE_FORBIDDEN_TOKENS: &[&str] = &[";", "&&", "||", "|", ">", "<", "`", "\n"];

/// Binary name assumed when a policy does not name one
pub const DEFAULT_BINARY: &str = "kubectl";

/// Maximum candidate length assumed when a policy does not set `max_length`
pub const DEFAULT_MAX_LENGTH: usize = 1024;
