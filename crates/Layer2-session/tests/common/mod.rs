//! 테스트용 가짜 드라이버

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use tether_session::{DriverError, DriverResult, Key, SessionDriver};
use tokio::time::Instant;

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
    calls: Mutex<Vec<(Instant, Call)>>,
    captures: Mutex<VecDeque<DriverResult<String>>>,
    fallback: Mutex<String>,
    fail_text: Mutex<Option<DriverError>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_capture(&self, screen: impl Into<String>) {
        self.captures.lock().push_back(Ok(screen.into()));
    }

    pub fn push_capture_error(&self, error: DriverError) {
        self.captures.lock().push_back(Err(error));
    }

    /// 스크립트가 끝난 뒤 돌려줄 화면
    pub fn set_fallback(&self, screen: impl Into<String>) {
        *self.fallback.lock() = screen.into();
    }

    pub fn fail_text_with(&self, error: DriverError) {
        *self.fail_text.lock() = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
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

    pub fn capture_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Capture(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((Instant::now(), call));
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
