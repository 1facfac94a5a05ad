//! 테스트용 가짜 드라이버와 기록용 알림 채널

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_session::{DriverError, DriverResult, Key, SessionDriver};
use tether_task::{MessageRef, Notifier, NotifyError};

/// 준비된 에이전트 화면 (프롬프트 표시 없음)
pub const READY_SCREEN: &str = "agent v1 ready\n? for shortcuts >_";

// ============================================================================
// FakeDriver
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure,
    Text(String),
    Key(Key),
    Capture(Option<i32>),
    ClearHistory,
}

/// 호출을 기록하고 캡처 결과를 순서대로 돌려준다
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<Call>>,
    captures: Mutex<VecDeque<DriverResult<String>>>,
    fallback: Mutex<String>,
    fail_text: Mutex<Option<DriverError>>,
    text_delay: Mutex<Option<Duration>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(screen: &str) -> Self {
        let driver = Self::default();
        driver.set_fallback(screen);
        driver
    }

    pub fn push_capture(&self, screen: impl Into<String>) {
        self.captures.lock().push_back(Ok(screen.into()));
    }

    pub fn push_capture_error(&self, error: DriverError) {
        self.captures.lock().push_back(Err(error));
    }

    pub fn set_fallback(&self, screen: impl Into<String>) {
        *self.fallback.lock() = screen.into();
    }

    pub fn fail_text_with(&self, error: DriverError) {
        *self.fail_text.lock() = Some(error);
    }

    /// 느린 세션 흉내 (텍스트 전송마다 지연)
    pub fn set_text_delay(&self, delay: Duration) {
        *self.text_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SessionDriver for FakeDriver {
    async fn has_session(&self, _session: &str) -> bool {
        true
    }

    async fn ensure_session(&self, _session: &str, _cwd: &Path) -> DriverResult<()> {
        self.record(Call::Ensure);
        Ok(())
    }

    async fn send_text(&self, _session: &str, text: &str, _literal: bool) -> DriverResult<()> {
        self.record(Call::Text(text.to_string()));
        let delay = *self.text_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_text.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_key(&self, _session: &str, key: Key) -> DriverResult<()> {
        self.record(Call::Key(key));
        Ok(())
    }

    async fn capture_pane(
        &self,
        _session: &str,
        start: Option<i32>,
        _end: Option<i32>,
    ) -> DriverResult<String> {
        self.record(Call::Capture(start));
        let next = self.captures.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.lock().clone()))
    }

    async fn clear_history(&self, _session: &str) -> DriverResult<()> {
        self.record(Call::ClearHistory);
        Ok(())
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

/// 전송된 메시지를 기록하고, 지정한 만큼 실패를 주입한다
#[derive(Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<(String, String)>>,
    updates: Mutex<Vec<(MessageRef, String)>>,
    next_id: AtomicUsize,
    post_failures: Mutex<VecDeque<NotifyError>>,
    update_failures: Mutex<VecDeque<NotifyError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_posts(&self, count: usize, error: NotifyError) {
        let mut failures = self.post_failures.lock();
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    pub fn fail_next_updates(&self, count: usize, error: NotifyError) {
        let mut failures = self.update_failures.lock();
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn posts_for(&self, context_id: &str) -> Vec<String> {
        self.posts
            .lock()
            .iter()
            .filter(|(ctx, _)| ctx == context_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn updates(&self) -> Vec<(MessageRef, String)> {
        self.updates.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    /// 전송된 모든 글 (post + update)
    pub fn all_text(&self) -> String {
        let mut all = self.posts();
        all.extend(self.updates().into_iter().map(|(_, text)| text));
        all.join("\n---\n")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, context_id: &str, text: &str) -> Result<MessageRef, NotifyError> {
        if let Some(error) = self.post_failures.lock().pop_front() {
            return Err(error);
        }
        self.posts
            .lock()
            .push((context_id.to_string(), text.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef::new(context_id, format!("m{}", id)))
    }

    async fn update(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError> {
        if let Some(error) = self.update_failures.lock().pop_front() {
            return Err(error);
        }
        self.updates.lock().push((message.clone(), text.to_string()));
        Ok(())
    }
}
