//! Remote command execution.
//!
//! The pipeline only needs "run a command, get exit status and output" and
//! "stream a long-running command's output line by line". Both are behind
//! [`RemoteSession`] so the pipeline can run against a scripted fake.

pub mod ssh;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::DeployError;
use crate::models::deployment::SshConfig;

/// Captured result of a one-shot remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout without surrounding whitespace
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Output lines of a streamed command. Dropping the stream abandons the command.
pub type LineStream = BoxStream<'static, String>;

/// Authenticated command-execution channel to one remote host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command to completion
    async fn exec(&self, command: &str) -> Result<CommandOutput, DeployError>;

    /// Start a command and stream its stdout and stderr lines as they arrive
    async fn stream(&self, command: &str) -> Result<LineStream, DeployError>;

    /// Close the session
    async fn close(&self) -> Result<(), DeployError>;
}

/// Opens remote sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, DeployError>;
}

/// Quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Prefix for commands that need root on the remote host
pub fn sudo_prefix(password: Option<&str>) -> String {
    match password {
        Some(password) => format!("echo {} | sudo -S ", shell_quote(password)),
        None => "sudo ".to_string(),
    }
}

/// Splits a byte stream into lines, keeping any trailing partial line
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(data);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Remaining partial line, if any
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(decode_line(&self.buf))
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
