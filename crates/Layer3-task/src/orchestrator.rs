//! Job Orchestrator
//!
//! 컨텍스트마다 Idle → Running → (WaitingForResponse → Running) → Idle.
//!
//! - 컨텍스트당 실행 중인 Job 은 최대 하나 (`running` 맵 + `JobQueue::claim_next`)
//! - 완료/실패 후에는 같은 루프에서 다음 Job 으로 넘어간다
//! - 취소는 다음 Job 을 시작하지 않는다
//! - 응답 대기 중에는 Job 이 Running 으로 남고 큐가 멈춘다
//! - 응답 대기가 만료되면 그 Job 은 실패하고 큐가 진행된다

use crate::format;
use crate::job::{Job, JobId, JobKind};
use crate::notify::{chunk_options, post_chunked, post_with_retry, Notifier};
use crate::progress::{ProgressStatus, ProgressTracker};
use crate::queue::{JobQueue, QueueSummary};
use crate::state::{SessionStateStore, WaitExpiry};
use crate::status::JobStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_foundation::{
    ChannelConfig, Error, NotifyConfig, OutputConfig, Result, TetherConfig, TimingConfig,
};
use tether_session::{dsl, Response, SessionController};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 오케스트레이터 설정
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 응답 대기 만료 시간
    pub response_timeout: chrono::Duration,
    pub timing: TimingConfig,
    pub output: OutputConfig,
    pub notify: NotifyConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&TetherConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &TetherConfig) -> Self {
        Self {
            response_timeout: chrono::Duration::minutes(config.recovery.response_timeout_minutes),
            timing: config.timing.clone(),
            output: config.output.clone(),
            notify: config.notify.clone(),
        }
    }
}

/// Job 하나를 돌린 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    /// 완료 또는 실패: 다음 Job 으로 진행
    Finished,
    /// 프롬프트 감지: 응답이 올 때까지 멈춤
    Waiting,
    /// 취소됨 (또는 이미 다른 경로에서 정리됨)
    Cancelled,
}

struct RunningEntry {
    job: Job,
    cancel: CancellationToken,
    channel: ChannelConfig,
    /// 프롬프트 감지 후 응답을 기다리는 중
    waiting: bool,
}

/// Job Orchestrator - 큐, 세션 상태, 세션 컨트롤러, 알림 채널을 묶는다
#[derive(Clone)]
pub struct JobOrchestrator {
    queue: Arc<JobQueue>,
    state: Arc<SessionStateStore>,
    controller: Arc<SessionController>,
    notifier: Arc<dyn Notifier>,
    progress: Option<ProgressTracker>,

    /// 컨텍스트별 실행 중인 Job
    running: Arc<Mutex<HashMap<String, RunningEntry>>>,

    config: Arc<OrchestratorConfig>,
}

impl JobOrchestrator {
    pub fn new(
        queue: Arc<JobQueue>,
        state: Arc<SessionStateStore>,
        controller: Arc<SessionController>,
        notifier: Arc<dyn Notifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            state,
            controller,
            notifier,
            progress: None,
            running: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// 진행 상황 추적 사용
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn state(&self) -> &Arc<SessionStateStore> {
        &self.state
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn add_job(&self, context_id: &str, kind: JobKind, payload: impl Into<String>) -> Job {
        self.queue.add_job(context_id, kind, payload)
    }

    pub fn get_running_job(&self, context_id: &str) -> Option<Job> {
        self.running
            .lock()
            .get(context_id)
            .and_then(|entry| self.queue.get_job(entry.job.id))
    }

    pub fn get_queue_summary(&self, context_id: &str) -> QueueSummary {
        self.queue.summary(context_id)
    }

    /// `/status` 응답
    pub fn queue_status(&self, context_id: &str) -> String {
        let running = self.get_running_job(context_id);
        format::queue_status(context_id, running.as_ref(), &self.get_queue_summary(context_id))
    }

    fn is_current(&self, context_id: &str, job_id: JobId) -> bool {
        self.running
            .lock()
            .get(context_id)
            .is_some_and(|entry| entry.job.id == job_id)
    }

    /// 취소됐거나 실행 슬롯을 잃었으면 true (이후 세션 호출은 하지 않는다)
    fn abandoned(&self, job: &Job, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() || !self.is_current(&job.context_id, job.id) {
            debug!(context_id = %job.context_id, job_id = %job.id, "Job no longer running, stopping");
            return true;
        }
        false
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// 다음 Pending Job 부터 차례로 실행
    ///
    /// 이미 실행 중인 Job 이 있으면 no-op. 완료나 실패 후에는 다음 Job 으로 넘어가고,
    /// 응답 대기나 취소에서 멈춘다.
    pub async fn start_job(&self, context_id: &str, channel: &ChannelConfig) {
        while let Some((job, cancel)) = self.claim(context_id, channel) {
            match self.run_job(&job, &cancel, channel).await {
                JobOutcome::Finished => continue,
                JobOutcome::Waiting | JobOutcome::Cancelled => break,
            }
        }
    }

    fn claim(
        &self,
        context_id: &str,
        channel: &ChannelConfig,
    ) -> Option<(Job, CancellationToken)> {
        let mut running = self.running.lock();
        if running.contains_key(context_id) {
            debug!(context_id, "Job already running");
            return None;
        }
        let job = self.queue.claim_next(context_id)?;
        let cancel = CancellationToken::new();
        running.insert(
            context_id.to_string(),
            RunningEntry {
                job: job.clone(),
                cancel: cancel.clone(),
                channel: channel.clone(),
                waiting: false,
            },
        );
        Some((job, cancel))
    }

    async fn run_job(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        channel: &ChannelConfig,
    ) -> JobOutcome {
        info!(context_id = %job.context_id, job_id = %job.id, kind = ?job.kind, "Job started");
        self.notify(&job.context_id, &format::job_started(job, &channel.project_name))
            .await;

        let result = match job.kind {
            JobKind::DslCommand => self.execute_dsl(job, cancel, channel).await,
            JobKind::RunSnippet | JobKind::AskPrompt => {
                self.execute_prompt(job, cancel, channel).await
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => self.fail_job(job, &e.to_string()).await,
        }
    }

    // ========================================================================
    // DSL
    // ========================================================================

    async fn execute_dsl(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        channel: &ChannelConfig,
    ) -> Result<JobOutcome> {
        let context_id = job.context_id.as_str();
        let session = channel.session_name.as_str();

        let segments = match dsl::parse(&job.payload) {
            Ok(segments) => segments,
            Err(e) => {
                warn!(context_id, job_id = %job.id, "Key command rejected: {}", e);
                self.notify(context_id, &format::dsl_parse_error(&e)).await;
                self.notify(context_id, &format::dsl_guide()).await;
                if !self.finish(job, JobStatus::Failed, Some(e.to_string())) {
                    return Ok(JobOutcome::Cancelled);
                }
                self.clear_session(context_id);
                return Ok(JobOutcome::Finished);
            }
        };
        if segments.is_empty() {
            return Err(Error::InvalidInput("no key commands found".into()));
        }

        if self.abandoned(job, cancel) {
            return Ok(JobOutcome::Cancelled);
        }
        info!(context_id, steps = segments.len(), "Executing {}", dsl::describe(&segments));
        self.controller.execute_sequence(session, &segments).await?;
        sleep_ms(self.config.timing.dsl_settle_ms).await;
        if self.abandoned(job, cancel) {
            return Ok(JobOutcome::Cancelled);
        }

        let capture = self
            .controller
            .capture_tail(
                session,
                self.config.output.dsl_scrollback_lines,
                self.config.output.dsl_window_lines,
            )
            .await?;

        if !self.finish(job, JobStatus::Completed, None) {
            return Ok(JobOutcome::Cancelled);
        }
        self.notify(context_id, &format::dsl_completed(job, segments.len(), &capture))
            .await;
        self.post_output(context_id, &capture.summary).await;
        if let Some(detection) = self.controller.detect_blocking_prompt(&capture.full_output) {
            self.notify(context_id, &format::prompt_help(detection.kind))
                .await;
        }
        Ok(JobOutcome::Finished)
    }

    // ========================================================================
    // Prompt
    // ========================================================================

    async fn execute_prompt(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        channel: &ChannelConfig,
    ) -> Result<JobOutcome> {
        let session = channel.session_name.as_str();

        let started = self
            .controller
            .start_agent(session, &channel.project_path, false)
            .await?;
        debug!(session, ?started, "Agent ready");
        if self.abandoned(job, cancel) {
            return Ok(JobOutcome::Cancelled);
        }

        self.controller.send_prompt(session, &job.payload).await?;
        if !self.record_prompt(job)? {
            return Ok(JobOutcome::Cancelled);
        }
        if !self.start_progress(job, cancel, session).await {
            return Ok(JobOutcome::Cancelled);
        }

        self.poll_and_report(job, cancel, channel).await
    }

    /// 출력이 안정될 때까지 기다린 뒤 프롬프트 감지 또는 완료 처리
    async fn poll_and_report(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        channel: &ChannelConfig,
    ) -> Result<JobOutcome> {
        let context_id = job.context_id.as_str();
        let timing = &self.config.timing;

        let stable = self
            .controller
            .poll_until_stable(
                &channel.session_name,
                timing.poll_interval(),
                timing.max_polls,
                Some(cancel),
            )
            .await?;

        let Some(capture) = stable else {
            if cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }
            return Err(Error::poll_timeout(timing.max_polls, timing.poll_interval_ms));
        };
        if !self.is_current(context_id, job.id) {
            debug!(context_id, job_id = %job.id, "Discarding output of a job that is no longer running");
            return Ok(JobOutcome::Cancelled);
        }

        if let Some(detection) = self.controller.detect_blocking_prompt(&capture.full_output) {
            if !self.enter_waiting(job, &capture.full_output)? {
                return Ok(JobOutcome::Cancelled);
            }
            self.stop_progress(job.id, ProgressStatus::Waiting).await;

            info!(
                context_id,
                job_id = %job.id,
                kind = %detection.kind,
                confidence = detection.confidence,
                "Agent is waiting for input"
            );
            self.post_output(context_id, &capture.summary).await;
            self.notify(context_id, &format::prompt_help(detection.kind))
                .await;
            return Ok(JobOutcome::Waiting);
        }

        if !self.finish(job, JobStatus::Completed, None) {
            return Ok(JobOutcome::Cancelled);
        }
        self.clear_session(context_id);
        self.stop_progress(job.id, ProgressStatus::Completed).await;

        info!(context_id, job_id = %job.id, lines = capture.total_lines, "Job completed");
        self.notify(context_id, &format::job_completed(job, &capture))
            .await;
        self.post_output(context_id, &capture.summary).await;
        Ok(JobOutcome::Finished)
    }

    // ========================================================================
    // Interactive response
    // ========================================================================

    /// 대기 중인 프롬프트에 y/n 응답 후 폴링 재개
    ///
    /// 응답 대기 중이 아니면 경고만 남기고 false. 대기는 응답을 보내기 전에
    /// 먼저 가져가므로, 같은 대기에 동시에 온 응답 중 하나만 세션에 전달된다.
    pub async fn handle_interactive_response(
        &self,
        context_id: &str,
        channel: &ChannelConfig,
        response: Response,
    ) -> bool {
        match self.state.take_waiting(context_id) {
            Ok(true) => {}
            Ok(false) => {
                warn!(context_id, %response, "Not waiting for a response");
                return false;
            }
            Err(e) => {
                error!(context_id, "Failed to update session state: {}", e);
                return false;
            }
        }

        let Some((job, cancel)) = self.resume_target(context_id, channel) else {
            warn!(context_id, "Waiting session has no job to resume");
            return false;
        };

        let outcome = match self.resume(&job, &cancel, channel, response).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail_job(&job, &e.to_string()).await,
        };
        if outcome == JobOutcome::Finished {
            self.start_job(context_id, channel).await;
        }
        true
    }

    async fn resume(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        channel: &ChannelConfig,
        response: Response,
    ) -> Result<JobOutcome> {
        let session = channel.session_name.as_str();
        self.controller.respond(session, response).await?;
        if !self.start_progress(job, cancel, session).await {
            return Ok(JobOutcome::Cancelled);
        }
        self.poll_and_report(job, cancel, channel).await
    }

    /// 멈춰 있는 현재 Job, 없으면 재시작 전 대기를 이어받은 Job
    fn resume_target(
        &self,
        context_id: &str,
        channel: &ChannelConfig,
    ) -> Option<(Job, CancellationToken)> {
        {
            let mut running = self.running.lock();
            if let Some(entry) = running.get_mut(context_id) {
                if !entry.waiting {
                    debug!(context_id, job_id = %entry.job.id, "Running job is not paused on a prompt");
                    return None;
                }
                entry.waiting = false;
                return Some((entry.job.clone(), entry.cancel.clone()));
            }
        }
        self.adopt_waiting_job(context_id, channel)
    }

    /// 재시작 전에 응답 대기 중이던 컨텍스트의 Job 을 다시 만든다
    fn adopt_waiting_job(
        &self,
        context_id: &str,
        channel: &ChannelConfig,
    ) -> Option<(Job, CancellationToken)> {
        let prompt = self
            .state
            .get_session(context_id)
            .and_then(|s| s.last_prompt)
            .unwrap_or_default();

        let mut running = self.running.lock();
        if running.contains_key(context_id) {
            return None;
        }
        let job = self
            .queue
            .add_running(context_id, JobKind::AskPrompt, prompt)?;
        let cancel = CancellationToken::new();
        running.insert(
            context_id.to_string(),
            RunningEntry {
                job: job.clone(),
                cancel: cancel.clone(),
                channel: channel.clone(),
                waiting: false,
            },
        );
        info!(context_id, job_id = %job.id, "Adopted waiting session");
        Some((job, cancel))
    }

    /// 응답 대기 만료: 멈춰 있던 Job 을 실패 처리하고 다음 Job 으로 진행
    ///
    /// 프롬프트에서 멈춘 Job 이 없으면 false.
    pub async fn expire_waiting(&self, context_id: &str) -> bool {
        let paused = {
            let mut running = self.running.lock();
            match running.get_mut(context_id) {
                Some(entry) if entry.waiting => {
                    entry.waiting = false;
                    Some((entry.job.clone(), entry.channel.clone()))
                }
                _ => None,
            }
        };
        let Some((job, channel)) = paused else {
            debug!(context_id, "No paused job to expire");
            return false;
        };

        let error = format!(
            "No response within {} minutes",
            self.config.response_timeout.num_minutes()
        );
        if self.fail_job(&job, &error).await == JobOutcome::Finished {
            self.start_job(context_id, &channel).await;
        }
        true
    }

    // ========================================================================
    // Cancel / Fail
    // ========================================================================

    /// 실행 중인 Job 취소
    ///
    /// 진행 중인 세션 호출은 끊지 않고, 그 결과는 버려진다. 다음 Job 은 시작하지 않는다.
    pub async fn cancel_job(&self, context_id: &str) -> bool {
        let entry = {
            let mut running = self.running.lock();
            let entry = running.remove(context_id);
            if let Some(entry) = &entry {
                self.queue
                    .update_status(entry.job.id, JobStatus::Cancelled, None);
            }
            entry
        };
        let Some(entry) = entry else {
            debug!(context_id, "No running job to cancel");
            return false;
        };

        entry.cancel.cancel();
        self.clear_session(context_id);
        self.stop_progress(entry.job.id, ProgressStatus::Cancelled)
            .await;

        info!(context_id, job_id = %entry.job.id, "Job cancelled");
        self.notify(context_id, &format::job_cancelled(&entry.job))
            .await;
        true
    }

    /// 실패 처리: 기록, 실행 슬롯 해제, 세션 초기화, 실패 알림
    async fn fail_job(&self, job: &Job, error: &str) -> JobOutcome {
        let context_id = job.context_id.as_str();
        if !self.finish(job, JobStatus::Failed, Some(error.to_string())) {
            debug!(context_id, job_id = %job.id, "Ignoring failure of a job that is no longer running: {}", error);
            return JobOutcome::Cancelled;
        }

        error!(context_id, job_id = %job.id, "Job failed: {}", error);
        self.clear_session(context_id);
        self.stop_progress(job.id, ProgressStatus::Failed(error.to_string()))
            .await;
        self.notify(context_id, &format::job_failed(job, error)).await;
        JobOutcome::Finished
    }

    /// 아직 현재 Job 이면 종료 상태로 바꾸고 실행 슬롯에서 뺀다
    fn finish(&self, job: &Job, status: JobStatus, error: Option<String>) -> bool {
        let mut running = self.running.lock();
        match running.get(&job.context_id) {
            Some(entry) if entry.job.id == job.id => {}
            _ => return false,
        }
        running.remove(&job.context_id);
        self.queue.update_status(job.id, status, error);
        true
    }

    /// 아직 현재 Job 일 때만 마지막 프롬프트 기록
    ///
    /// 실행 슬롯 잠금 안에서 쓰므로 취소 쪽의 세션 초기화 뒤에 덮어쓰지 않는다.
    fn record_prompt(&self, job: &Job) -> Result<bool> {
        let running = self.running.lock();
        if !running
            .get(&job.context_id)
            .is_some_and(|entry| entry.job.id == job.id)
        {
            return Ok(false);
        }
        self.state.set_last_prompt(&job.context_id, &job.payload)?;
        Ok(true)
    }

    /// 응답 대기 기록 (아직 현재 Job 일 때만)
    fn enter_waiting(&self, job: &Job, output: &str) -> Result<bool> {
        let mut running = self.running.lock();
        let Some(entry) = running
            .get_mut(&job.context_id)
            .filter(|entry| entry.job.id == job.id)
        else {
            return Ok(false);
        };
        self.state
            .begin_waiting(&job.context_id, self.config.response_timeout)?;
        self.state.set_last_output(&job.context_id, output)?;
        entry.waiting = true;
        Ok(true)
    }

    fn clear_session(&self, context_id: &str) {
        if let Err(e) = self.state.clear_session(context_id) {
            warn!(context_id, "Failed to clear session state: {}", e);
        }
    }

    // ========================================================================
    // Notifications / progress
    // ========================================================================

    async fn notify(&self, context_id: &str, text: &str) {
        if let Err(e) =
            post_with_retry(self.notifier.as_ref(), context_id, text, &self.config.notify).await
        {
            warn!(context_id, "Notification failed: {}", e);
        }
    }

    async fn post_output(&self, context_id: &str, output: &str) {
        if output.trim().is_empty() {
            return;
        }
        let options = chunk_options(&self.config.notify);
        post_chunked(
            self.notifier.as_ref(),
            context_id,
            output,
            &self.config.notify,
            &options,
        )
        .await;
    }

    /// 진행 추적 시작. 그 사이 Job 이 취소됐으면 추적을 바로 멈추고 false
    async fn start_progress(&self, job: &Job, cancel: &CancellationToken, session: &str) -> bool {
        let Some(progress) = &self.progress else {
            return !self.abandoned(job, cancel);
        };
        if let Err(e) = progress
            .start_tracking(job.id, &job.context_id, session)
            .await
        {
            warn!(job_id = %job.id, "Progress tracking unavailable: {}", e);
        }
        if self.abandoned(job, cancel) {
            progress.stop_tracking(job.id, ProgressStatus::Cancelled).await;
            return false;
        }
        true
    }

    async fn stop_progress(&self, job_id: JobId, status: ProgressStatus) {
        if let Some(progress) = &self.progress {
            progress.stop_tracking(job_id, status).await;
        }
    }
}

/// 만료 처리는 정리 루프 밖의 별도 태스크에서 돈다
impl WaitExpiry for JobOrchestrator {
    fn on_wait_expired(&self, context_id: &str) {
        let orchestrator = self.clone();
        let context_id = context_id.to_string();
        tokio::spawn(async move {
            orchestrator.expire_waiting(&context_id).await;
        });
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
