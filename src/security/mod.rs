pub mod critic;

pub use critic::{evaluate, ApprovedCommand, CandidateCommand, Critic, CriticRejection, Verdict};

/// Reason attached to every approved verdict
pub const APPROVAL_REASON: &str = "policy satisfied";

/// Printable ASCII range accepted in a candidate command
pub const PRINTABLE_ASCII: std::ops::RangeInclusive<u8> = 0x20..=0x7e;
