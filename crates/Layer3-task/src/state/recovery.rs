//! 상태 복구
//!
//! 시작할 때 한 번 `recover_state` 를 실행하고, 이후에는 주기적으로
//! 응답 대기 타임아웃을 정리한다.

use super::store::SessionStateStore;
use crate::queue::JobQueue;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tether_foundation::{ChannelConfig, ChannelRegistry, Result};
use tracing::{debug, error, info, warn};

/// 컨텍스트 → 채널 설정 조회
pub trait ChannelLookup: Send + Sync {
    fn channel(&self, context_id: &str) -> Option<ChannelConfig>;
}

impl ChannelLookup for ChannelRegistry {
    fn channel(&self, context_id: &str) -> Option<ChannelConfig> {
        self.get(context_id).cloned()
    }
}

impl ChannelLookup for HashMap<String, ChannelConfig> {
    fn channel(&self, context_id: &str) -> Option<ChannelConfig> {
        self.get(context_id).cloned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySummary {
    /// 그대로 유지한 세션
    pub recovered: usize,
    /// 타임아웃으로 초기화한 세션
    pub timed_out: usize,
    /// 채널이 없어 삭제한 세션
    pub cleaned_up: usize,
    /// 보관 기간이 지나 삭제한 Job
    pub jobs_removed: usize,
}

/// 시작 시 상태 복구
///
/// 1. 등록되지 않았거나 설정이 유효하지 않은 컨텍스트의 세션 삭제
/// 2. 응답 대기 시간이 지난 세션 초기화
/// 3. 나머지(응답 대기 포함)는 유지
/// 4. 보관 기간이 지난 종료 Job 정리
pub fn recover_state(
    store: &SessionStateStore,
    channels: &dyn ChannelLookup,
    queue: &JobQueue,
    retention: Duration,
) -> Result<RecoverySummary> {
    let sessions = store.all_sessions();
    info!(sessions = sessions.len(), "Starting state recovery");

    let mut summary = RecoverySummary::default();

    for session in sessions {
        let context_id = session.context_id.as_str();

        match channels.channel(context_id) {
            Some(channel) if channel.is_valid() => {}
            Some(_) => {
                warn!(context_id, "Channel config is invalid, removing session");
                store.delete_session(context_id)?;
                summary.cleaned_up += 1;
                continue;
            }
            None => {
                warn!(context_id, "Channel not registered, removing session");
                store.delete_session(context_id)?;
                summary.cleaned_up += 1;
                continue;
            }
        }

        if store.has_timed_out(context_id) {
            info!(context_id, "Response wait timed out, clearing session");
            store.clear_session(context_id)?;
            summary.timed_out += 1;
            continue;
        }

        if session.is_waiting_for_response {
            info!(context_id, "Session still waiting for a response");
        }
        summary.recovered += 1;
    }

    summary.jobs_removed = queue.cleanup(retention);

    info!(
        recovered = summary.recovered,
        timed_out = summary.timed_out,
        cleaned_up = summary.cleaned_up,
        jobs_removed = summary.jobs_removed,
        "State recovery finished"
    );
    Ok(summary)
}

/// 응답 대기가 만료된 컨텍스트를 넘겨받는 쪽 (멈춰 있던 Job 정리)
pub trait WaitExpiry: Send + Sync {
    fn on_wait_expired(&self, context_id: &str);
}

/// 응답 대기 시간이 지난 세션 초기화, 초기화한 컨텍스트 반환
pub fn sweep_timed_out_sessions(store: &SessionStateStore) -> Result<Vec<String>> {
    let expired = store.take_timed_out_sessions()?;
    for context_id in &expired {
        info!(context_id = %context_id, "Response wait timed out, session cleared");
    }
    Ok(expired)
}

/// 주기적 정리 시작 (타임아웃 세션 + 오래된 Job)
///
/// `expiry` 가 있으면 만료된 컨텍스트마다 알린다.
pub fn start_periodic_sweep(
    store: Arc<SessionStateStore>,
    queue: Arc<JobQueue>,
    expiry: Option<Arc<dyn WaitExpiry>>,
    interval: std::time::Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        // 첫 tick 은 즉시 완료되므로 건너뜀
        interval_timer.tick().await;

        loop {
            interval_timer.tick().await;

            match sweep_timed_out_sessions(&store) {
                Ok(expired) if expired.is_empty() => {}
                Ok(expired) => {
                    info!(cleared = expired.len(), "Periodic sweep cleared timed-out sessions");
                    if let Some(expiry) = &expiry {
                        for context_id in &expired {
                            expiry.on_wait_expired(context_id);
                        }
                    }
                }
                Err(e) => error!("Periodic sweep failed: {}", e),
            }

            let removed = queue.cleanup(retention);
            if removed > 0 {
                debug!("Periodic sweep: removed {} jobs", removed);
            }
        }
    })
}
