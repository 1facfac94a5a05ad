//! Console notifier
//!
//! 채널 메시지를 표준 출력(또는 임의의 writer)에 쓴다. 갱신은 같은
//! 메시지 번호로 다시 출력한다.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_task::{MessageRef, Notifier, NotifyError};

pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
    next_id: AtomicU64,
}

impl ConsoleNotifier {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicU64::new(1),
        }
    }

    fn write_block(&self, header: &str, text: &str) -> Result<(), NotifyError> {
        let mut out = self.out.lock();
        writeln!(out, "{}\n{}\n", header, text)
            .and_then(|_| out.flush())
            .map_err(|e| NotifyError::Network(e.to_string()))
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn post(&self, context_id: &str, text: &str) -> Result<MessageRef, NotifyError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let message = MessageRef::new(context_id, id);
        self.write_block(&format!("[{}] #{}", message.context_id, message.id), text)?;
        Ok(message)
    }

    async fn update(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError> {
        self.write_block(
            &format!("[{}] #{} (updated)", message.context_id, message.id),
            text,
        )
    }
}
