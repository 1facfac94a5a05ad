//! Job definition and types

use crate::status::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// 실행 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    /// 코드 조각 실행 요청
    RunSnippet,
    /// 일반 프롬프트
    AskPrompt,
    /// 백틱 키/텍스트 명령
    DslCommand,
}

impl JobKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            JobKind::RunSnippet => "Run snippet",
            JobKind::AskPrompt => "Prompt",
            JobKind::DslCommand => "Key command",
        }
    }

    /// 에이전트에 프롬프트를 보내고 폴링하는 종류인지
    pub fn is_prompt(&self) -> bool {
        matches!(self, JobKind::RunSnippet | JobKind::AskPrompt)
    }
}

/// 컨텍스트 큐의 작업 하나
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub context_id: String,
    pub kind: JobKind,
    pub payload: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(context_id: impl Into<String>, kind: JobKind, payload: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            context_id: context_id.into(),
            kind,
            payload: payload.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// 상태 전이 + 타임스탬프 기록
    ///
    /// 허용되지 않는 전이면 아무것도 바꾸지 않고 false.
    pub fn transition(&mut self, next: JobStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        if next.is_running() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        if error.is_some() {
            self.error = error;
        }
        self.status = next;
        true
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// 실행 시간 (시작 전이면 None)
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.completed_at.unwrap_or_else(Utc::now) - started)
    }

    /// 앞부분 미리보기
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.payload, max_chars)
    }
}

/// 문자 단위로 자르고 잘렸으면 `...` 를 붙인다
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
