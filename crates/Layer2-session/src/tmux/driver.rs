//! tmux driver
//!
//! 이름이 붙은 tmux 세션 하나에 대한 기본 동작. 재시도는 하지 않는다.

use crate::dsl::Key;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// 세션 명령 실패
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("session '{0}' not found")]
    SessionMissing(String),

    #[error("tmux {command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("tmux {command} failed: {message}")]
    Exec { command: String, message: String },

    #[error("failed to run tmux: {0}")]
    Spawn(String),
}

impl From<DriverError> for tether_foundation::Error {
    fn from(e: DriverError) -> Self {
        tether_foundation::Error::Driver(e.to_string())
    }
}

// ============================================================================
// SessionDriver trait
// ============================================================================

#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn has_session(&self, session: &str) -> bool;

    /// 세션이 없으면 `cwd` 에서 새로 만든다
    async fn ensure_session(&self, session: &str, cwd: &Path) -> DriverResult<()>;

    /// 여러 줄이면 줄마다 보내고 줄 사이에만 Enter 를 보낸다
    async fn send_text(&self, session: &str, text: &str, literal: bool) -> DriverResult<()>;

    async fn send_key(&self, session: &str, key: Key) -> DriverResult<()>;

    /// `start` 가 음수면 스크롤백 포함
    async fn capture_pane(
        &self,
        session: &str,
        start: Option<i32>,
        end: Option<i32>,
    ) -> DriverResult<String>;

    async fn clear_history(&self, session: &str) -> DriverResult<()>;
}

// ============================================================================
// TmuxDriver
// ============================================================================

/// tmux 바이너리를 직접 실행하는 드라이버
#[derive(Debug, Clone)]
pub struct TmuxDriver {
    binary: PathBuf,
    timeout: Duration,
}

impl TmuxDriver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: PathBuf::from("tmux"),
            timeout,
        }
    }

    /// PATH 에서 tmux 를 찾는다
    pub fn detect(timeout: Duration) -> Option<Self> {
        which::which("tmux").ok().map(|binary| Self { binary, timeout })
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, session: &str, args: &[&str]) -> DriverResult<String> {
        let command = args.first().copied().unwrap_or_default().to_string();
        debug!(session, ?args, "tmux");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(DriverError::Spawn(e.to_string())),
            Err(_) => {
                return Err(DriverError::Timeout {
                    command,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_missing_session(&stderr) {
            Err(DriverError::SessionMissing(session.to_string()))
        } else {
            Err(DriverError::Exec {
                command,
                message: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            })
        }
    }
}

fn is_missing_session(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    ["can't find session", "can't find pane", "no server running", "session not found"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[async_trait]
impl SessionDriver for TmuxDriver {
    async fn has_session(&self, session: &str) -> bool {
        self.run(session, &["has-session", "-t", session])
            .await
            .is_ok()
    }

    async fn ensure_session(&self, session: &str, cwd: &Path) -> DriverResult<()> {
        if self.has_session(session).await {
            return Ok(());
        }
        let cwd = cwd.to_string_lossy();
        self.run(session, &["new-session", "-d", "-s", session, "-c", &cwd])
            .await?;
        info!(session, cwd = %cwd, "Created tmux session");
        Ok(())
    }

    async fn send_text(&self, session: &str, text: &str, literal: bool) -> DriverResult<()> {
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len().saturating_sub(1);

        for (i, line) in lines.iter().copied().enumerate() {
            if !line.is_empty() {
                let mut args = vec!["send-keys", "-t", session];
                if literal {
                    args.push("-l");
                }
                // 대시로 시작하는 텍스트가 옵션으로 해석되지 않도록
                args.push("--");
                args.push(line);
                self.run(session, &args).await?;
            }
            if i < last {
                self.send_key(session, Key::Enter).await?;
            }
        }
        Ok(())
    }

    async fn send_key(&self, session: &str, key: Key) -> DriverResult<()> {
        self.run(session, &["send-keys", "-t", session, key.tmux_name()])
            .await
            .map(|_| ())
    }

    async fn capture_pane(
        &self,
        session: &str,
        start: Option<i32>,
        end: Option<i32>,
    ) -> DriverResult<String> {
        let start = start.map(|s| s.to_string());
        let end = end.map(|e| e.to_string());

        let mut args = vec!["capture-pane", "-p", "-t", session];
        if let Some(start) = start.as_deref() {
            args.extend(["-S", start]);
        }
        if let Some(end) = end.as_deref() {
            args.extend(["-E", end]);
        }
        self.run(session, &args).await
    }

    async fn clear_history(&self, session: &str) -> DriverResult<()> {
        self.run(session, &["clear-history", "-t", session])
            .await
            .map(|_| ())
    }
}
