//! Progress Tracker
//!
//! 실행 중인 Job 의 터미널 출력을 주기적으로 캡처해 채널 메시지 하나를
//! 제자리에서 갱신한다. 오케스트레이터의 폴링과는 독립적이다.
//!
//! Job 마다 상태(메시지 참조, 해시, 실패 카운터, 타이머)를 따로 가진다.

use crate::format;
use crate::job::JobId;
use crate::notify::{MessageRef, Notifier};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_foundation::{Error, ProgressConfig, Result};
use tether_session::{process_capture, SessionDriver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 추적 종료 시 표시할 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Failed(String),
    Cancelled,
    Waiting,
}

/// tick 한 번의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 출력이 이전과 같아 전송 생략
    Unchanged,
    /// 메시지 갱신됨
    Updated,
    /// 캡처 실패 (연속 횟수)
    CaptureFailed(u32),
    /// 채널 갱신 실패 (연속 횟수)
    ChannelFailed(u32),
    /// 임계치 도달로 추적 중단
    Aborted,
    /// 추적 중이 아님
    NotTracked,
}

struct ProgressState {
    context_id: String,
    session: String,
    message: MessageRef,
    started: Instant,
    last_hash: Option<String>,
    session_failures: u32,
    channel_failures: u32,
}

struct TrackingEntry {
    state: ProgressState,
    poller: Option<JoinHandle<()>>,
    timeout: Option<JoinHandle<()>>,
}

struct TrackerInner {
    driver: Arc<dyn SessionDriver>,
    notifier: Arc<dyn Notifier>,
    config: ProgressConfig,
    active: Mutex<HashMap<JobId, TrackingEntry>>,
}

#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn to_chrono(elapsed: Duration) -> chrono::Duration {
    chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
}

impl ProgressTracker {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notifier>,
        config: ProgressConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                driver,
                notifier,
                config,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn is_tracking(&self, job_id: JobId) -> bool {
        self.inner.active.lock().contains_key(&job_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// 추적 중인 Job 의 컨텍스트
    pub fn context_of(&self, job_id: JobId) -> Option<String> {
        self.inner
            .active
            .lock()
            .get(&job_id)
            .map(|e| e.state.context_id.clone())
    }

    // ========================================================================
    // Start / Stop
    // ========================================================================

    /// 시작 메시지를 올리고 폴러와 타임아웃 타이머를 건다
    ///
    /// 시작 메시지 전송에 실패하면 추적하지 않고 에러를 돌려준다.
    pub async fn start_tracking(&self, job_id: JobId, context_id: &str, session: &str) -> Result<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }
        if let Some(previous) = self.inner.active.lock().remove(&job_id) {
            abort_timers(previous);
        }

        let message = self
            .inner
            .notifier
            .post(context_id, &format::progress_starting())
            .await
            .map_err(|e| {
                warn!(%job_id, context_id, "Failed to start progress tracking: {}", e);
                Error::from(e)
            })?;

        self.inner.active.lock().insert(
            job_id,
            TrackingEntry {
                state: ProgressState {
                    context_id: context_id.to_string(),
                    session: session.to_string(),
                    message,
                    started: Instant::now(),
                    last_hash: None,
                    session_failures: 0,
                    channel_failures: 0,
                },
                poller: None,
                timeout: None,
            },
        );

        let poller = self.spawn_poller(job_id);
        let timeout = self.spawn_timeout(job_id);
        match self.inner.active.lock().get_mut(&job_id) {
            Some(entry) => {
                entry.poller = Some(poller);
                entry.timeout = Some(timeout);
            }
            None => {
                poller.abort();
                timeout.abort();
            }
        }

        info!(%job_id, context_id, "Progress tracking started");
        Ok(())
    }

    /// 마지막 캡처로 메시지를 한 번 더 갱신하고 정리
    ///
    /// 추적 중이 아닌 Job 이면 아무것도 하지 않는다.
    pub async fn stop_tracking(&self, job_id: JobId, status: ProgressStatus) {
        let Some(entry) = self.inner.active.lock().remove(&job_id) else {
            debug!(%job_id, "stop_tracking: job not tracked");
            return;
        };
        let TrackingEntry {
            state,
            poller,
            timeout,
        } = entry;
        for handle in [poller, timeout].into_iter().flatten() {
            handle.abort();
        }

        let output = self.capture_window(&state.session).await;
        let text = format::progress_final(
            &status,
            to_chrono(state.started.elapsed()),
            output.as_deref(),
        );
        if let Err(e) = self.inner.notifier.update(&state.message, &text).await {
            warn!(%job_id, "Failed to send final progress message: {}", e);
        }

        info!(%job_id, ?status, "Progress tracking stopped");
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// 한 번 캡처해서 바뀌었으면 메시지 갱신
    pub async fn tick(&self, job_id: JobId) -> TickOutcome {
        let session = match self.inner.active.lock().get(&job_id) {
            Some(entry) => entry.state.session.clone(),
            None => return TickOutcome::NotTracked,
        };

        let Some(output) = self.capture_window(&session).await else {
            return self.record_capture_failure(job_id).await;
        };
        let hash = content_hash(&output);

        let (message, elapsed) = {
            let mut active = self.inner.active.lock();
            let Some(entry) = active.get_mut(&job_id) else {
                return TickOutcome::NotTracked;
            };
            if entry.state.session_failures > 0 {
                debug!(%job_id, "Capture recovered");
                entry.state.session_failures = 0;
            }
            if entry.state.last_hash.as_deref() == Some(hash.as_str()) {
                return TickOutcome::Unchanged;
            }
            (entry.state.message.clone(), entry.state.started.elapsed())
        };

        let text = format::progress_update(to_chrono(elapsed), &output);
        let sent = self.inner.notifier.update(&message, &text).await;

        let mut active = self.inner.active.lock();
        let Some(entry) = active.get_mut(&job_id) else {
            return TickOutcome::NotTracked;
        };
        match sent {
            Ok(()) => {
                entry.state.last_hash = Some(hash);
                entry.state.channel_failures = 0;
                TickOutcome::Updated
            }
            Err(e) => {
                entry.state.channel_failures += 1;
                let failures = entry.state.channel_failures;
                warn!(
                    %job_id,
                    failures,
                    max = self.inner.config.max_channel_failures,
                    "Progress update failed: {}",
                    e
                );
                if failures >= self.inner.config.max_channel_failures {
                    if let Some(entry) = active.remove(&job_id) {
                        detach_from_poller(entry);
                    }
                    warn!(%job_id, "Progress tracking aborted after channel failures");
                    TickOutcome::Aborted
                } else {
                    TickOutcome::ChannelFailed(failures)
                }
            }
        }
    }

    async fn record_capture_failure(&self, job_id: JobId) -> TickOutcome {
        let (failures, aborted) = {
            let mut active = self.inner.active.lock();
            let Some(entry) = active.get_mut(&job_id) else {
                return TickOutcome::NotTracked;
            };
            entry.state.session_failures += 1;
            let failures = entry.state.session_failures;
            warn!(
                %job_id,
                failures,
                max = self.inner.config.max_session_failures,
                "No output captured"
            );
            if failures >= self.inner.config.max_session_failures {
                (failures, active.remove(&job_id))
            } else {
                (failures, None)
            }
        };

        let Some(entry) = aborted else {
            return TickOutcome::CaptureFailed(failures);
        };
        let message = entry.state.message.clone();
        detach_from_poller(entry);

        if let Err(e) = self
            .inner
            .notifier
            .update(&message, &format::progress_session_error(failures))
            .await
        {
            warn!(%job_id, "Failed to send session error message: {}", e);
        }
        warn!(%job_id, failures, "Progress tracking aborted after capture failures");
        TickOutcome::Aborted
    }

    async fn capture_window(&self, session: &str) -> Option<String> {
        let window = self.inner.config.window_lines;
        match self
            .inner
            .driver
            .capture_pane(session, Some(-(window as i32)), None)
            .await
        {
            Ok(raw) => {
                let capture = process_capture(&raw, 0, window as usize);
                (!capture.full_output.is_empty()).then_some(capture.summary)
            }
            Err(e) => {
                debug!(session, "Progress capture failed: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn spawn_poller(&self, job_id: JobId) -> JoinHandle<()> {
        let tracker = self.clone();
        let period = self.inner.config.interval().max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tracker.tick(job_id).await {
                    TickOutcome::Aborted | TickOutcome::NotTracked => break,
                    _ => {}
                }
            }
        })
    }

    fn spawn_timeout(&self, job_id: JobId) -> JoinHandle<()> {
        let tracker = self.clone();
        let limit = self.inner.config.timeout();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tracker.on_timeout(job_id, limit).await;
        })
    }

    /// 시간 초과: 폴러를 멈추고 알림만 보낸다
    async fn on_timeout(&self, job_id: JobId, limit: Duration) {
        let Some(entry) = self.inner.active.lock().remove(&job_id) else {
            return;
        };
        if let Some(poller) = entry.poller {
            poller.abort();
        }
        warn!(%job_id, limit_secs = limit.as_secs(), "Progress tracking timed out");

        if let Err(e) = self
            .inner
            .notifier
            .update(&entry.state.message, &format::progress_timeout(limit))
            .await
        {
            warn!(%job_id, "Failed to send timeout message: {}", e);
        }
    }
}

fn abort_timers(entry: TrackingEntry) {
    for handle in [entry.poller, entry.timeout].into_iter().flatten() {
        handle.abort();
    }
}

/// tick 은 폴러 안에서도 불리므로 폴러는 abort 하지 않는다 (다음 tick 에서 스스로 종료)
fn detach_from_poller(entry: TrackingEntry) {
    if let Some(timeout) = entry.timeout {
        timeout.abort();
    }
}
