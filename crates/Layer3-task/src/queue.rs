//! Job Queue - 컨텍스트별 FIFO
//!
//! 메모리에만 있다. 한 컨텍스트에 Running 인 Job 은 최대 하나.

use crate::job::{Job, JobId, JobKind};
use crate::status::JobStatus;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 상태별 Job 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl QueueSummary {
    fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

#[derive(Default)]
struct QueueInner {
    queues: HashMap<String, Vec<Job>>,
    index: HashMap<JobId, String>,
}

impl QueueInner {
    fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        let context = self.index.get(&id)?;
        self.queues
            .get_mut(context)?
            .iter_mut()
            .find(|job| job.id == id)
    }

    fn has_running(&self, context_id: &str) -> bool {
        self.queues
            .get(context_id)
            .is_some_and(|jobs| jobs.iter().any(|j| j.status.is_running()))
    }
}

/// 컨텍스트별 Job 큐
#[derive(Default)]
pub struct JobQueue {
    inner: RwLock<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending Job 추가
    pub fn add_job(&self, context_id: &str, kind: JobKind, payload: impl Into<String>) -> Job {
        let job = Job::new(context_id, kind, payload);
        let mut inner = self.inner.write();
        inner.index.insert(job.id, context_id.to_string());
        let queue = inner.queues.entry(context_id.to_string()).or_default();
        queue.push(job.clone());
        info!(
            context_id,
            job_id = %job.id,
            kind = ?job.kind,
            queued = queue.len(),
            "Job added"
        );
        job
    }

    /// 첫 번째 Pending Job (FIFO)
    pub fn next_job(&self, context_id: &str) -> Option<Job> {
        self.inner
            .read()
            .queues
            .get(context_id)?
            .iter()
            .find(|job| job.status.is_pending())
            .cloned()
    }

    /// 다음 Pending Job 을 Running 으로 바꾸고 반환
    ///
    /// 이미 Running 인 Job 이 있으면 None.
    pub fn claim_next(&self, context_id: &str) -> Option<Job> {
        let mut inner = self.inner.write();
        if inner.has_running(context_id) {
            return None;
        }
        let job = inner
            .queues
            .get_mut(context_id)?
            .iter_mut()
            .find(|job| job.status.is_pending())?;
        job.transition(JobStatus::Running, None);
        debug!(context_id, job_id = %job.id, "Job claimed");
        Some(job.clone())
    }

    /// 바로 Running 상태인 Job 을 추가 (재시작 후 응답 대기를 이어받을 때)
    ///
    /// 이미 Running 인 Job 이 있으면 None.
    pub fn add_running(
        &self,
        context_id: &str,
        kind: JobKind,
        payload: impl Into<String>,
    ) -> Option<Job> {
        let mut inner = self.inner.write();
        if inner.has_running(context_id) {
            return None;
        }
        let mut job = Job::new(context_id, kind, payload);
        job.transition(JobStatus::Running, None);
        inner.index.insert(job.id, context_id.to_string());
        inner
            .queues
            .entry(context_id.to_string())
            .or_default()
            .push(job.clone());
        info!(context_id, job_id = %job.id, "Running job adopted");
        Some(job)
    }

    /// 상태 변경
    ///
    /// 종료된 Job 이나 역방향 전이는 경고만 남기고 무시한다.
    pub fn update_status(&self, job_id: JobId, status: JobStatus, error: Option<String>) -> bool {
        let mut inner = self.inner.write();

        if status.is_running() {
            let context = inner.index.get(&job_id).cloned();
            if let Some(context) = context {
                if inner.has_running(&context) {
                    warn!(job_id = %job_id, "Another job is already running in {}", context);
                    return false;
                }
            }
        }

        let Some(job) = inner.job_mut(job_id) else {
            warn!(job_id = %job_id, "Job not found");
            return false;
        };

        let from = job.status;
        if !job.transition(status, error) {
            warn!(job_id = %job_id, "Ignoring status change {} → {}", from, status);
            return false;
        }
        debug!(job_id = %job_id, "Job status {} → {}", from, status);
        true
    }

    /// 취소 (이미 종료된 Job 이면 false)
    pub fn cancel(&self, job_id: JobId) -> bool {
        let mut inner = self.inner.write();
        let Some(job) = inner.job_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "Cancel rejected");
            return false;
        }
        job.transition(JobStatus::Cancelled, None);
        info!(job_id = %job_id, "Job cancelled");
        true
    }

    pub fn get_job(&self, job_id: JobId) -> Option<Job> {
        let inner = self.inner.read();
        let context = inner.index.get(&job_id)?;
        inner
            .queues
            .get(context)?
            .iter()
            .find(|job| job.id == job_id)
            .cloned()
    }

    pub fn context_jobs(&self, context_id: &str) -> Vec<Job> {
        self.inner
            .read()
            .queues
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn running_job(&self, context_id: &str) -> Option<Job> {
        self.inner
            .read()
            .queues
            .get(context_id)?
            .iter()
            .find(|job| job.status.is_running())
            .cloned()
    }

    pub fn pending_count(&self, context_id: &str) -> usize {
        self.summary(context_id).pending
    }

    pub fn summary(&self, context_id: &str) -> QueueSummary {
        let mut summary = QueueSummary::default();
        if let Some(jobs) = self.inner.read().queues.get(context_id) {
            for job in jobs {
                summary.add(job.status);
            }
        }
        summary
    }

    pub fn context_ids(&self) -> Vec<String> {
        self.inner.read().queues.keys().cloned().collect()
    }

    /// 컨텍스트의 Pending Job 을 모두 취소
    pub fn cancel_pending(&self, context_id: &str) -> usize {
        let mut inner = self.inner.write();
        let Some(jobs) = inner.queues.get_mut(context_id) else {
            return 0;
        };
        let mut cancelled = 0;
        for job in jobs.iter_mut().filter(|j| j.status.is_pending()) {
            job.transition(JobStatus::Cancelled, None);
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(context_id, cancelled, "Pending jobs cancelled");
        }
        cancelled
    }

    /// 보관 기간이 지난 종료 Job 삭제
    pub fn cleanup(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut inner = self.inner.write();
        let mut removed_ids = Vec::new();

        for jobs in inner.queues.values_mut() {
            jobs.retain(|job| {
                let expired = job.status.is_terminal()
                    && job.completed_at.is_some_and(|done| done < cutoff);
                if expired {
                    removed_ids.push(job.id);
                }
                !expired
            });
        }
        inner.queues.retain(|_, jobs| !jobs.is_empty());
        for id in &removed_ids {
            inner.index.remove(id);
        }

        if !removed_ids.is_empty() {
            info!(removed = removed_ids.len(), "Cleaned up finished jobs");
        }
        removed_ids.len()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, job_id: JobId, by: Duration) {
        let mut inner = self.inner.write();
        if let Some(job) = inner.job_mut(job_id) {
            job.created_at = job.created_at - by;
            job.completed_at = job.completed_at.map(|t| t - by);
        }
    }
}

// ============================================================================
// 테스트
// ============================================================================
