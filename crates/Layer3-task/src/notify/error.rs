//! Notification channel errors
//!
//! NotifyError는 채널 전송 실패를 표현하며 foundation Error로 변환된다.

use tether_foundation::Error as FoundationError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// 채널이 전송 속도를 제한함
    #[error("Rate limited by channel")]
    RateLimited,

    /// 연결 실패 등 일시적 오류
    #[error("Network error: {0}")]
    Network(String),

    /// 채널이 메시지를 거부함 (길이 초과, 권한 등)
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// 갱신 대상 메시지를 찾을 수 없음
    #[error("Unknown message: {0}")]
    UnknownMessage(String),
}

impl NotifyError {
    /// 재시도로 해결될 수 있는 에러인지
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::RateLimited | NotifyError::Network(_))
    }
}

impl From<NotifyError> for FoundationError {
    fn from(e: NotifyError) -> Self {
        FoundationError::Notification(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(NotifyError::RateLimited.is_retryable());
        assert!(NotifyError::Network("reset".into()).is_retryable());
        assert!(!NotifyError::Rejected("too long".into()).is_retryable());
        assert!(!NotifyError::UnknownMessage("m1".into()).is_retryable());
    }

    #[test]
    fn test_into_foundation_error() {
        let err: FoundationError = NotifyError::Rejected("too long".into()).into();
        assert!(matches!(err, FoundationError::Notification(_)));
        assert!(err.to_string().contains("too long"));
    }
}
