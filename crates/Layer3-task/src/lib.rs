//! # tether-task
//!
//! Job execution core for tether.
//! 채팅 채널 하나(컨텍스트)마다 Job 큐를 두고, 터미널 세션의 에이전트에
//! 순서대로 보내고, 결과를 채널로 돌려준다.
//!
//! ## Features
//!
//! - 컨텍스트별 FIFO 큐 (실행 중 Job 최대 하나)
//! - 오케스트레이터: 시작 → 폴링 → 프롬프트 감지 → 응답 → 재개
//! - 응답 대기 상태 파일 저장과 재시작 복구
//! - 채널 메시지 제자리 갱신으로 진행 상황 표시
//! - 긴 메시지 분할, 재시도

pub mod format;
pub mod input;
pub mod job;
pub mod notify;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod state;
pub mod status;

// Job / Queue
pub use job::{Job, JobId, JobKind};
pub use queue::{JobQueue, QueueSummary};
pub use status::JobStatus;

// Orchestration
pub use input::{classify_input, InputAction, MetaCommand};
pub use orchestrator::{JobOrchestrator, OrchestratorConfig};
pub use progress::{ProgressStatus, ProgressTracker, TickOutcome};

// Notification
pub use notify::{
    chunk_message, post_chunked, ChunkOptions, MessageRef, Notifier, NotifyError, RetryConfig,
};

// Session state
pub use state::{
    recover_state, start_periodic_sweep, sweep_timed_out_sessions, ChannelLookup,
    RecoverySummary, SessionState, SessionStateStore, StateSummary, WaitExpiry,
};
