//! Session State Store
//!
//! 모든 변경은 즉시 state.json 전체를 다시 쓴다. 읽기 실패는 빈 상태로
//! 시작하고, 쓰기 실패는 호출자에게 전달한다.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tether_foundation::{JsonStore, Result};
use tracing::{debug, info, warn};

/// 상태 파일명
pub const STATE_FILE: &str = "state.json";

/// 컨텍스트 하나의 세션 상태
///
/// `timeout_at` 은 `is_waiting_for_response` 가 true 일 때만 존재한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub context_id: String,
    pub is_waiting_for_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
}

impl SessionState {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            is_waiting_for_response: false,
            timeout_at: None,
            last_prompt: None,
            last_output: None,
        }
    }

    pub fn has_timed_out_at(&self, now: DateTime<Utc>) -> bool {
        self.timeout_at.is_some_and(|deadline| now > deadline)
    }
}

/// state.json 전체
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionState>,
    pub last_updated: DateTime<Utc>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub total: usize,
    pub waiting: usize,
    pub timed_out: usize,
}

/// 파일 기반 세션 상태 저장소
pub struct SessionStateStore {
    store: JsonStore,
    state: Mutex<StateFile>,
}

impl SessionStateStore {
    /// `dir/state.json` 을 읽어서 연다
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(dir);
        let state = match store.load_optional::<StateFile>(STATE_FILE) {
            Ok(Some(state)) => {
                info!(sessions = state.sessions.len(), "Loaded session state");
                state
            }
            Ok(None) => {
                debug!("No state file, starting empty");
                StateFile::default()
            }
            Err(e) => {
                warn!("{}, starting with empty state", e);
                StateFile::default()
            }
        };
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.store.file_path(STATE_FILE)
    }

    pub fn dir(&self) -> &Path {
        self.store.base_dir()
    }

    /// 한 세션을 읽고-수정하고-저장
    fn mutate<R>(&self, context_id: &str, f: impl FnOnce(&mut SessionState) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .entry(context_id.to_string())
            .or_insert_with(|| SessionState::new(context_id));
        let out = f(session);
        state.last_updated = Utc::now();
        self.store.save(STATE_FILE, &*state)?;
        Ok(out)
    }

    pub fn get_session(&self, context_id: &str) -> Option<SessionState> {
        self.state.lock().sessions.get(context_id).cloned()
    }

    /// 세션 전체 교체
    pub fn set_session(&self, session: SessionState) -> Result<()> {
        let context_id = session.context_id.clone();
        self.mutate(&context_id, move |s| *s = session)
    }

    /// 응답 대기 시작 (`timeout` 후 만료)
    pub fn begin_waiting(&self, context_id: &str, timeout: Duration) -> Result<()> {
        let deadline = Utc::now() + timeout;
        self.mutate(context_id, |s| {
            s.is_waiting_for_response = true;
            s.timeout_at = Some(deadline);
        })?;
        info!(context_id, timeout_at = %deadline, "Waiting for response");
        Ok(())
    }

    /// 응답 대기 해제
    pub fn end_waiting(&self, context_id: &str) -> Result<()> {
        self.mutate(context_id, |s| {
            s.is_waiting_for_response = false;
            s.timeout_at = None;
        })
    }

    /// 응답 대기 중이면 해제하고 true (확인과 해제가 한 잠금 안에서 일어난다)
    ///
    /// 같은 대기에 대한 응답이 동시에 여러 개 와도 하나만 true 를 받는다.
    pub fn take_waiting(&self, context_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(session) = state.sessions.get_mut(context_id) else {
            return Ok(false);
        };
        if !session.is_waiting_for_response {
            return Ok(false);
        }
        session.is_waiting_for_response = false;
        session.timeout_at = None;
        state.last_updated = Utc::now();
        self.store.save(STATE_FILE, &*state)?;
        debug!(context_id, "Response wait claimed");
        Ok(true)
    }

    /// `waiting` 이 true 면 `timeout` 후 만료, false 면 해제
    pub fn set_waiting_for_response(
        &self,
        context_id: &str,
        waiting: bool,
        timeout: Duration,
    ) -> Result<()> {
        if waiting {
            self.begin_waiting(context_id, timeout)
        } else {
            self.end_waiting(context_id)
        }
    }

    pub fn is_waiting_for_response(&self, context_id: &str) -> bool {
        self.state
            .lock()
            .sessions
            .get(context_id)
            .is_some_and(|s| s.is_waiting_for_response)
    }

    pub fn has_timed_out(&self, context_id: &str) -> bool {
        self.state
            .lock()
            .sessions
            .get(context_id)
            .is_some_and(|s| s.has_timed_out_at(Utc::now()))
    }

    pub fn set_last_prompt(&self, context_id: &str, prompt: &str) -> Result<()> {
        self.mutate(context_id, |s| s.last_prompt = Some(prompt.to_string()))
    }

    pub fn set_last_output(&self, context_id: &str, output: &str) -> Result<()> {
        self.mutate(context_id, |s| s.last_output = Some(output.to_string()))
    }

    /// 기본 상태로 초기화 (레코드는 남김)
    pub fn clear_session(&self, context_id: &str) -> Result<()> {
        self.mutate(context_id, |s| *s = SessionState::new(context_id))?;
        debug!(context_id, "Session state cleared");
        Ok(())
    }

    /// 레코드 삭제
    pub fn delete_session(&self, context_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.sessions.remove(context_id).is_none() {
            return Ok(false);
        }
        state.last_updated = Utc::now();
        self.store.save(STATE_FILE, &*state)?;
        info!(context_id, "Session state deleted");
        Ok(true)
    }

    pub fn all_sessions(&self) -> Vec<SessionState> {
        self.state.lock().sessions.values().cloned().collect()
    }

    pub fn find_timed_out_sessions(&self) -> Vec<String> {
        let now = Utc::now();
        self.state
            .lock()
            .sessions
            .values()
            .filter(|s| s.has_timed_out_at(now))
            .map(|s| s.context_id.clone())
            .collect()
    }

    /// 만료된 세션을 한 번에 초기화하고 그 컨텍스트 목록을 돌려준다
    pub fn take_timed_out_sessions(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .sessions
            .values()
            .filter(|s| s.has_timed_out_at(now))
            .map(|s| s.context_id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(expired);
        }
        for context_id in &expired {
            state
                .sessions
                .insert(context_id.clone(), SessionState::new(context_id.as_str()));
        }
        state.last_updated = now;
        self.store.save(STATE_FILE, &*state)?;
        Ok(expired)
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.state.lock().last_updated
    }

    pub fn summary(&self) -> StateSummary {
        let now = Utc::now();
        let state = self.state.lock();
        StateSummary {
            total: state.sessions.len(),
            waiting: state
                .sessions
                .values()
                .filter(|s| s.is_waiting_for_response)
                .count(),
            timed_out: state
                .sessions
                .values()
                .filter(|s| s.has_timed_out_at(now))
                .count(),
        }
    }
}

// ============================================================================
// 테스트
// ============================================================================
