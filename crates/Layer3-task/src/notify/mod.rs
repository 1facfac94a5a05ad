//! Notification channel
//!
//! 채팅 채널에 메시지를 올리고(post) 같은 메시지를 갱신(update)한다.
//! 긴 텍스트는 `chunk_message`로 나눈 뒤 `post_chunked`로 보낸다.

mod chunk;
mod error;
mod retry;

pub use chunk::{
    add_split_indicators, chunk_message, convert_backticks, split_message, wrap_in_code_blocks,
    ChunkOptions,
};
pub use error::NotifyError;
pub use retry::{with_retry, RetryConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tether_foundation::NotifyConfig;
use tracing::{debug, warn};

/// 채널에 올라간 메시지 참조 (나중에 update 할 때 사용)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub context_id: String,
    pub id: String,
}

impl MessageRef {
    pub fn new(context_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context_id, self.id)
    }
}

/// 알림 채널 (Discord, 콘솔 등)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 새 메시지 전송
    async fn post(&self, context_id: &str, text: &str) -> Result<MessageRef, NotifyError>;

    /// 기존 메시지를 제자리에서 갱신
    async fn update(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError>;
}

/// 설정에 맞춰 분할 옵션 구성
pub fn chunk_options(config: &NotifyConfig) -> ChunkOptions {
    ChunkOptions {
        max_length: config.chunk_size,
        wrap_code_block: config.wrap_code_block,
        add_indicators: true,
    }
}

/// 긴 텍스트를 나눠 순서대로 전송
///
/// 조각마다 재시도를 거치며, 끝내 실패한 조각은 로그만 남기고 건너뛴다.
/// 전달된 조각의 참조를 반환한다.
pub async fn post_chunked(
    notifier: &dyn Notifier,
    context_id: &str,
    text: &str,
    config: &NotifyConfig,
    options: &ChunkOptions,
) -> Vec<MessageRef> {
    let chunks = chunk_message(text, options);
    let retry = RetryConfig::from(&config.retry);
    let total = chunks.len();
    let mut delivered = Vec::with_capacity(total);

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && config.chunk_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.chunk_delay_ms)).await;
        }

        match with_retry(&retry, "post", || notifier.post(context_id, chunk)).await {
            Ok(message) => delivered.push(message),
            Err(e) => warn!(context_id, part = i + 1, total, "Failed to deliver chunk: {}", e),
        }
    }

    debug!(context_id, delivered = delivered.len(), total, "Chunked message posted");
    delivered
}

/// 한 메시지 전송 (재시도 포함)
pub async fn post_with_retry(
    notifier: &dyn Notifier,
    context_id: &str,
    text: &str,
    config: &NotifyConfig,
) -> Result<MessageRef, NotifyError> {
    let retry = RetryConfig::from(&config.retry);
    with_retry(&retry, "post", || notifier.post(context_id, text)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// 정해진 횟수만큼 실패하는 채널
    struct FlakyNotifier {
        sent: Mutex<Vec<String>>,
        failures: Mutex<Vec<NotifyError>>,
    }

    impl FlakyNotifier {
        fn new(failures: Vec<NotifyError>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn post(&self, context_id: &str, text: &str) -> Result<MessageRef, NotifyError> {
            if let Some(e) = self.failures.lock().pop() {
                return Err(e);
            }
            let mut sent = self.sent.lock();
            sent.push(text.to_string());
            Ok(MessageRef::new(context_id, sent.len().to_string()))
        }

        async fn update(&self, _message: &MessageRef, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn config() -> NotifyConfig {
        NotifyConfig {
            chunk_delay_ms: 0,
            ..NotifyConfig::default()
        }
    }

    #[test]
    fn test_post_chunked_delivers_in_order() {
        let notifier = FlakyNotifier::new(Vec::new());
        let text = (0..200)
            .map(|i| format!("line {:03} {}", i, "-".repeat(40)))
            .collect::<Vec<_>>()
            .join("\n");

        let refs = tokio_test::block_on(post_chunked(
            &notifier,
            "C1",
            &text,
            &config(),
            &chunk_options(&config()),
        ));

        let sent = notifier.sent.lock().clone();
        assert!(sent.len() > 1);
        assert_eq!(refs.len(), sent.len());
        assert!(sent[0].starts_with(&format!("[1/{}]", sent.len())));
        assert!(sent.last().unwrap().contains("line 199"));
    }

    #[test]
    fn test_rejected_chunk_is_skipped() {
        let notifier = FlakyNotifier::new(vec![NotifyError::Rejected("too long".into())]);
        let refs = tokio_test::block_on(post_chunked(
            &notifier,
            "C1",
            "short",
            &config(),
            &ChunkOptions::plain(2_500),
        ));
        assert!(refs.is_empty());
        assert!(notifier.sent.lock().is_empty());
    }

    #[test]
    fn test_post_with_retry_ok() {
        let notifier = FlakyNotifier::new(Vec::new());
        let result = tokio_test::block_on(post_with_retry(&notifier, "C1", "hi", &config()));
        let message = tokio_test::assert_ok!(result);
        assert_eq!(message.to_string(), "C1#1");
    }
}
