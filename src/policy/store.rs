use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::policy::{BASELINE_FORBIDDEN_TOKENS, DEFAULT_BINARY, DEFAULT_MAX_LENGTH};

/// Reference rule set written by `Policy::write_default`
pub const DEFAULT_POLICY: &str = r#"# kubetalk critic rules
#
# One directive per line: `key: value value ...`
# Escapes accepted in forbidden_tokens: \n \r \t \s (space) \\

binary: kubectl

# Read-only inspection verbs. Anything not listed here is rejected.
allowed_verbs: get describe logs

# Always rejected, even if someone adds them to allowed_verbs by mistake.
forbidden_verbs: delete apply exec edit create rollout patch replace scale
forbidden_verbs: label annotate set expose run attach cp drain cordon uncordon taint
forbidden_verbs: port-forward proxy debug auth certificate

# Shell operators. The separators ; && || | > < ` and newline are always enforced.
forbidden_tokens: ; && || | > < ` $( \n

# Mutating flags nested under otherwise allowed verbs (matched case-insensitively).
forbidden_flags: --force --dry-run=client --dry-run=server --overwrite --kubeconfig --token

max_length: 1024
"#;

#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("Failed to read policy source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Policy source is empty")]
    Empty,

    #[error("Malformed policy line {line}: {content}")]
    MalformedLine { line: usize, content: String },

    #[error("Unknown policy directive '{directive}' on line {line}")]
    UnknownDirective { line: usize, directive: String },

    #[error("Invalid escape in forbidden token '{token}' on line {line}")]
    InvalidEscape { line: usize, token: String },

    #[error("Policy binary must be a single name (line {line})")]
    InvalidBinary { line: usize },

    #[error("Invalid max_length '{value}' on line {line}")]
    InvalidMaxLength { line: usize, value: String },

    #[error("Policy defines no allowed verbs")]
    NoAllowedVerbs,

    #[error("Verb '{0}' is both allowed and forbidden")]
    ConflictingVerb(String),
}

/// Immutable safety policy consumed by the critic.
///
/// All sets are ordered so that evaluation order, and therefore the rule
/// reported on rejection, never depends on hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    binary: String,
    allowed_verbs: BTreeSet<String>,
    forbidden_verbs: BTreeSet<String>,
    forbidden_tokens: BTreeSet<String>,
    forbidden_flags: BTreeSet<String>,
    max_length: usize,
}

impl Policy {
    /// Load a policy from a line-oriented text file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyLoadError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| PolicyLoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let policy = Self::parse(&contents)?;
        tracing::info!(
            path = %path.display(),
            allowed = policy.allowed_verbs.len(),
            forbidden = policy.forbidden_verbs.len(),
            "policy loaded"
        );
        Ok(policy)
    }

    /// Parse policy text.
    ///
    /// Anything that is not a well-formed directive fails the whole load:
    /// a half-understood policy is never used.
    pub fn parse(contents: &str) -> Result<Self, PolicyLoadError> {
        if contents.trim().is_empty() {
            return Err(PolicyLoadError::Empty);
        }

        let mut binary: Option<String> = None;
        let mut allowed_verbs = BTreeSet::new();
        let mut forbidden_verbs = BTreeSet::new();
        let mut forbidden_tokens: BTreeSet<String> = BASELINE_FORBIDDEN_TOKENS
            .iter()
            .map(|t| t.to_string())
            .collect();
        let mut forbidden_flags = BTreeSet::new();
        let mut max_length = DEFAULT_MAX_LENGTH;

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(PolicyLoadError::MalformedLine {
                    line: line_no,
                    content: line.to_string(),
                });
            };
            let values = value.split_whitespace();

            match key.trim() {
                "binary" => {
                    let names: Vec<&str> = values.collect();
                    if names.len() != 1 {
                        return Err(PolicyLoadError::InvalidBinary { line: line_no });
                    }
                    if binary.as_deref().is_some_and(|b| b != names[0]) {
                        return Err(PolicyLoadError::InvalidBinary { line: line_no });
                    }
                    binary = Some(names[0].to_string());
                }
                "allowed_verbs" => allowed_verbs.extend(values.map(str::to_string)),
                "forbidden_verbs" => forbidden_verbs.extend(values.map(str::to_string)),
                "forbidden_flags" => forbidden_flags.extend(values.map(str::to_string)),
                "forbidden_tokens" => {
                    for token in values {
                        forbidden_tokens.insert(unescape_token(token, line_no)?);
                    }
                }
                "max_length" => {
                    let value = value.trim();
                    max_length = match value.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => {
                            return Err(PolicyLoadError::InvalidMaxLength {
                                line: line_no,
                                value: value.to_string(),
                            });
                        }
                    };
                }
                other => {
                    return Err(PolicyLoadError::UnknownDirective {
                        line: line_no,
                        directive: other.to_string(),
                    });
                }
            }
        }

        if allowed_verbs.is_empty() {
            return Err(PolicyLoadError::NoAllowedVerbs);
        }

        if let Some(verb) = allowed_verbs.intersection(&forbidden_verbs).next() {
            return Err(PolicyLoadError::ConflictingVerb(verb.clone()));
        }

        Ok(Self {
            binary: binary.unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            allowed_verbs,
            forbidden_verbs,
            forbidden_tokens,
            forbidden_flags,
            max_length,
        })
    }

    /// Write the reference policy to `path` unless a file already exists there.
    ///
    /// Returns `true` if the file was created.
    pub fn write_default<P: AsRef<Path>>(path: P) -> std::io::Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_POLICY)?;
        Ok(true)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn allowed_verbs(&self) -> &BTreeSet<String> {
        &self.allowed_verbs
    }

    pub fn forbidden_verbs(&self) -> &BTreeSet<String> {
        &self.forbidden_verbs
    }

    pub fn forbidden_tokens(&self) -> &BTreeSet<String> {
        &self.forbidden_tokens
    }

    pub fn forbidden_flags(&self) -> &BTreeSet<String> {
        &self.forbidden_flags
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

/// Decode the escapes allowed in a forbidden token
fn unescape_token(token: &str, line: usize) -> Result<String, PolicyLoadError> {
    let invalid = || PolicyLoadError::InvalidEscape {
        line,
        token: token.to_string(),
    };

    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}
