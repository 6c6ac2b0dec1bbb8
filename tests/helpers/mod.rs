#![allow(dead_code)]

use async_trait::async_trait;
use kubetalk::llm::{LLMClient, LLMError};
use kubetalk::Policy;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Rules used by pipeline tests: the cluster binary is `echo`, so approved
/// commands run a harmless real process that prints its arguments.
pub const ECHO_POLICY: &str = "\
binary: echo
allowed_verbs: get describe logs
forbidden_verbs: delete apply exec edit create patch scale
forbidden_tokens: $(
forbidden_flags: --force --dry-run --overwrite
max_length: 256
";

/// Write `contents` to a policy file inside a fresh temp directory
pub fn write_policy(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("critic_rules.txt");
    fs::write(&path, contents).unwrap();
    (temp_dir, path)
}

pub fn echo_policy() -> Policy {
    Policy::parse(ECHO_POLICY).unwrap()
}

pub fn kubectl_policy() -> Policy {
    Policy::parse(kubetalk::policy::DEFAULT_POLICY).unwrap()
}

/// How the fake backend answers one kind of call
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

/// Text backend that answers generation and summarization calls from a script
pub struct FakeLLM {
    command: Reply,
    summary: Reply,
    generation_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl FakeLLM {
    pub fn new(command: Reply, summary: Reply) -> Self {
        Self {
            command,
            summary,
            generation_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        }
    }

    /// Echo the request back as the command; summarize by quoting stdout
    pub fn echoing() -> Self {
        Self::new(Reply::Text(String::new()), Reply::Text(String::new()))
    }

    pub fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    async fn answer(reply: &Reply, fallback: String) -> Result<String, LLMError> {
        match reply {
            Reply::Text(text) if text.is_empty() => Ok(fallback),
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(LLMError::ApiError("backend unavailable".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LLMError::Timeout)
            }
        }
    }
}

#[async_trait]
impl LLMClient for FakeLLM {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LLMError> {
        if system.contains("summarizing") {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            let quoted = user
                .split_once("stdout:\n")
                .map(|(_, rest)| rest.split("\nstderr:").next().unwrap_or("").trim())
                .unwrap_or("")
                .to_string();
            Self::answer(&self.summary, format!("Summary: {}", quoted)).await
        } else {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            let request = user.strip_prefix("Request: ").unwrap_or(user).to_string();
            Self::answer(&self.command, request).await
        }
    }
}

/// Whether a `sleep <duration>` process is alive (zombies have no cmdline)
#[cfg(target_os = "linux")]
pub fn sleep_is_running(duration: &str) -> bool {
    let wanted = format!("sleep\0{}\0", duration);
    fs::read_dir("/proc")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| fs::read(entry.path().join("cmdline")).ok())
        .any(|cmdline| cmdline.ends_with(wanted.as_bytes()))
}

/// Poll for up to two seconds until the `sleep` process is (or is not) alive
#[cfg(target_os = "linux")]
pub async fn wait_for_sleep(duration: &str, running: bool) -> bool {
    for _ in 0..100 {
        if sleep_is_running(duration) == running {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
