use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::policy::Policy;
use crate::security::{APPROVAL_REASON, PRINTABLE_ASCII};

/// Model-produced text that claims to be a cluster inspection command.
///
/// Nothing about it is trusted until the critic has approved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCommand(String);

impl CandidateCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rule that caused a candidate to be rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriticRejection {
    #[error("empty command")]
    EmptyCommand,

    #[error("command length {length} exceeds maximum {max}")]
    TooLong { length: usize, max: usize },

    #[error("non-printable or non-ASCII byte 0x{byte:02x} at position {position}")]
    NonPrintable { position: usize, byte: u8 },

    #[error("forbidden token '{}'", .0.escape_debug())]
    ForbiddenToken(String),

    #[error("malformed quoting: {0}")]
    MalformedQuoting(String),

    #[error("command must start with '{expected}', found '{found}'")]
    WrongBinary { expected: String, found: String },

    #[error("no verb follows '{0}'")]
    MissingVerb(String),

    #[error("forbidden verb '{0}'")]
    ForbiddenVerb(String),

    #[error("verb '{0}' is not in the allowed list")]
    VerbNotAllowed(String),

    #[error("forbidden flag '{0}'")]
    ForbiddenFlag(String),
}

impl CriticRejection {
    /// Stable identifier of the rule, for audit records
    pub fn rule(&self) -> &'static str {
        match self {
            CriticRejection::EmptyCommand => "empty-command",
            CriticRejection::TooLong { .. } => "max-length",
            CriticRejection::NonPrintable { .. } => "printable-ascii",
            CriticRejection::ForbiddenToken(_) => "forbidden-token",
            CriticRejection::MalformedQuoting(_) => "malformed-quoting",
            CriticRejection::WrongBinary { .. } => "binary-name",
            CriticRejection::MissingVerb(_) => "missing-verb",
            CriticRejection::ForbiddenVerb(_) => "forbidden-verb",
            CriticRejection::VerbNotAllowed(_) => "verb-not-allowed",
            CriticRejection::ForbiddenFlag(_) => "forbidden-flag",
        }
    }
}

/// A command that passed every critic rule.
///
/// Only the critic can build one, and the executor accepts nothing else, so a
/// process can never be launched for a string that was not approved. The
/// argument vector is the one validation ran on; execution reuses it as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedCommand {
    command: String,
    argv: Vec<String>,
}

impl ApprovedCommand {
    /// The exact candidate string that was approved
    pub fn command(&self) -> &str {
        &self.command
    }

    // argv always holds the binary and the verb: check() rejects anything shorter
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn verb(&self) -> &str {
        &self.argv[1]
    }
}

/// The critic's decision for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved(ApprovedCommand),
    Rejected(CriticRejection),
}

impl Verdict {
    pub fn approved(&self) -> bool {
        matches!(self, Verdict::Approved(_))
    }

    pub fn reason(&self) -> String {
        match self {
            Verdict::Approved(_) => APPROVAL_REASON.to_string(),
            Verdict::Rejected(rejection) => rejection.to_string(),
        }
    }

    pub fn rejection(&self) -> Option<&CriticRejection> {
        match self {
            Verdict::Approved(_) => None,
            Verdict::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Evaluate a candidate against a policy.
///
/// Pure function of its inputs: no I/O, no clock, no randomness.
pub fn evaluate(candidate: &str, policy: &Policy) -> Verdict {
    match check(candidate, policy) {
        Ok(argv) => Verdict::Approved(ApprovedCommand {
            command: candidate.to_string(),
            argv,
        }),
        Err(rejection) => Verdict::Rejected(rejection),
    }
}

fn check(candidate: &str, policy: &Policy) -> Result<Vec<String>, CriticRejection> {
    if candidate.trim().is_empty() {
        return Err(CriticRejection::EmptyCommand);
    }

    if candidate.len() > policy.max_length() {
        return Err(CriticRejection::TooLong {
            length: candidate.len(),
            max: policy.max_length(),
        });
    }

    if let Some((position, byte)) = candidate
        .bytes()
        .enumerate()
        .find(|(_, b)| !PRINTABLE_ASCII.contains(b))
    {
        return Err(CriticRejection::NonPrintable { position, byte });
    }

    // Raw scan before tokenization: quoting must not hide a separator
    if let Some(token) = find_forbidden_token(candidate, policy) {
        return Err(CriticRejection::ForbiddenToken(token.to_string()));
    }

    let argv = shell_words::split(candidate)
        .map_err(|e| CriticRejection::MalformedQuoting(e.to_string()))?;

    let Some(program) = argv.first() else {
        return Err(CriticRejection::EmptyCommand);
    };
    if program != policy.binary() {
        return Err(CriticRejection::WrongBinary {
            expected: policy.binary().to_string(),
            found: program.clone(),
        });
    }

    let Some(verb) = argv.get(1) else {
        return Err(CriticRejection::MissingVerb(program.clone()));
    };
    if policy.forbidden_verbs().contains(verb) {
        return Err(CriticRejection::ForbiddenVerb(verb.clone()));
    }
    if !policy.allowed_verbs().contains(verb) {
        return Err(CriticRejection::VerbNotAllowed(verb.clone()));
    }

    if let Some(flag) = find_forbidden_flag(&argv[2..], policy) {
        return Err(CriticRejection::ForbiddenFlag(flag));
    }

    Ok(argv)
}

/// Earliest forbidden token in the raw string; the longer token wins a tie
fn find_forbidden_token<'p>(candidate: &str, policy: &'p Policy) -> Option<&'p str> {
    policy
        .forbidden_tokens()
        .iter()
        .filter_map(|token| candidate.find(token.as_str()).map(|pos| (pos, token)))
        .min_by(|(pa, ta), (pb, tb)| pa.cmp(pb).then(tb.len().cmp(&ta.len())))
        .map(|(_, token)| token.as_str())
}

fn find_forbidden_flag(args: &[String], policy: &Policy) -> Option<String> {
    for arg in args {
        let arg_lower = arg.to_lowercase();
        for flag in policy.forbidden_flags() {
            let flag_lower = flag.to_lowercase();
            let matches = arg_lower == flag_lower
                || arg_lower
                    .strip_prefix(flag_lower.as_str())
                    .is_some_and(|rest| rest.starts_with('='));
            if matches {
                return Some(arg.clone());
            }
        }
    }
    None
}

/// Critic bound to the process-wide policy
#[derive(Debug, Clone)]
pub struct Critic {
    policy: Arc<Policy>,
}

impl Critic {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn evaluate(&self, candidate: &CandidateCommand) -> Verdict {
        let verdict = evaluate(candidate.as_str(), &self.policy);
        match &verdict {
            Verdict::Approved(_) => tracing::debug!(command = %candidate, "critic approved"),
            Verdict::Rejected(rejection) => tracing::info!(
                command = %candidate.as_str().escape_debug(),
                rule = rejection.rule(),
                reason = %rejection,
                "critic rejected"
            ),
        }
        verdict
    }
}
