//! Error types for tether
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// tether 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 명령 파싱
    // ========================================================================
    #[error("{0}")]
    Parse(String),

    // ========================================================================
    // 터미널 세션
    // ========================================================================
    #[error("Session driver error: {0}")]
    Driver(String),

    #[error("Agent failed to start: {0}")]
    AgentStart(String),

    #[error("Output did not stabilize after {polls} polls ({interval_ms}ms interval)")]
    PollTimeout { polls: u32, interval_ms: u64 },

    // ========================================================================
    // 알림 채널
    // ========================================================================
    #[error("Notification error: {0}")]
    Notification(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Notification(_) | Error::PollTimeout { .. }
        )
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::PollTimeout { .. }
                | Error::AgentStart(_)
                | Error::Cancelled
        )
    }

    pub fn poll_timeout(polls: u32, interval_ms: u64) -> Self {
        Error::PollTimeout { polls, interval_ms }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
