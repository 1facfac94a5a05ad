//! `tether serve` - 표준 입력 한 줄을 채널 메시지 하나로 처리
//!
//! 시작 시 상태를 복구하고 주기적 정리를 건 다음, 입력마다
//! `classify_input` 결과에 따라 Job 을 큐에 넣거나 메타 명령을 처리한다.
//! Job 실행은 별도 태스크에서 돌기 때문에 실행 중에도 `/status`, `/cancel`
//! 이 바로 처리된다.

use crate::console::ConsoleNotifier;
use anyhow::Context;
use std::sync::Arc;
use tether_foundation::{ChannelConfig, ChannelRegistry, JsonStore, TetherConfig};
use tether_session::{SessionController, SessionDriver, TmuxDriver};
use tether_task::{
    classify_input, format, recover_state, start_periodic_sweep, InputAction, JobKind,
    JobOrchestrator, JobQueue, MetaCommand, Notifier, OrchestratorConfig, ProgressTracker,
    SessionStateStore, WaitExpiry,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub async fn run(store: JsonStore, config: TetherConfig, context_id: &str) -> anyhow::Result<()> {
    let mut registry = ChannelRegistry::load(store.clone())?;
    let channel = registry.get(context_id).cloned().with_context(|| {
        format!(
            "Channel {} is not registered (use `tether channel add`)",
            context_id
        )
    })?;
    registry.touch(context_id)?;

    let driver = TmuxDriver::detect(config.timing.command_timeout())
        .context("tmux not found in PATH")?;
    let driver: Arc<dyn SessionDriver> = Arc::new(driver);
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier::stdout());

    // ========================================================================
    // Recovery
    // ========================================================================
    let queue = Arc::new(JobQueue::new());
    let state = Arc::new(SessionStateStore::open(
        config.state_dir_or(store.base_dir()),
    ));
    let retention = chrono::Duration::hours(config.recovery.retention_hours);
    let summary = recover_state(&state, &registry, &queue, retention)?;
    debug!(?summary, "Recovered state");

    // ========================================================================
    // Orchestrator
    // ========================================================================
    let controller = Arc::new(SessionController::from_config(driver.clone(), &config));
    let mut orchestrator = JobOrchestrator::new(
        queue.clone(),
        state.clone(),
        controller,
        notifier.clone(),
        OrchestratorConfig::from_config(&config),
    );
    if config.progress.enabled {
        orchestrator = orchestrator.with_progress(ProgressTracker::new(
            driver,
            notifier.clone(),
            config.progress.clone(),
        ));
    }

    let expiry: Arc<dyn WaitExpiry> = Arc::new(orchestrator.clone());
    let sweep = start_periodic_sweep(
        state,
        queue,
        Some(expiry),
        config.recovery.sweep_interval(),
        retention,
    );

    info!(
        context_id,
        project = %channel.project_name,
        session = %channel.session_name,
        "Serving channel (type /help for commands)"
    );

    let server = Server {
        orchestrator,
        notifier,
        channel: Arc::new(channel),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => server.dispatch(&line).await,
                None => {
                    info!("Input closed");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    sweep.abort();
    Ok(())
}

struct Server {
    orchestrator: JobOrchestrator,
    notifier: Arc<dyn Notifier>,
    channel: Arc<ChannelConfig>,
}

impl Server {
    fn context_id(&self) -> &str {
        &self.channel.context_id
    }

    async fn dispatch(&self, line: &str) {
        match classify_input(line) {
            InputAction::Ignore => {}
            InputAction::Meta(MetaCommand::Status) => {
                self.reply(&self.orchestrator.queue_status(self.context_id()))
                    .await;
            }
            InputAction::Meta(MetaCommand::Help) => self.reply(&format::help()).await,
            InputAction::Meta(MetaCommand::Cancel) => {
                let (orchestrator, notifier, channel) = self.handles();
                tokio::spawn(async move {
                    if !orchestrator.cancel_job(&channel.context_id).await {
                        post(&notifier, &channel.context_id, "No running job to cancel").await;
                    }
                });
            }
            InputAction::Meta(MetaCommand::Respond(response)) => {
                let (orchestrator, notifier, channel) = self.handles();
                tokio::spawn(async move {
                    let handled = orchestrator
                        .handle_interactive_response(&channel.context_id, &channel, response)
                        .await;
                    if !handled {
                        post(&notifier, &channel.context_id, "No prompt is waiting for a response")
                            .await;
                    }
                });
            }
            InputAction::Dsl(text) => self.submit(JobKind::DslCommand, text).await,
            InputAction::Prompt { kind, text } => self.submit(kind, text).await,
        }
    }

    /// 큐에 넣고 실행 태스크를 띄운다 (이미 실행 중이면 start_job 은 no-op)
    async fn submit(&self, kind: JobKind, text: String) {
        let job = self.orchestrator.add_job(self.context_id(), kind, text);
        debug!(job_id = %job.id, ?kind, "Job queued");

        if self.orchestrator.get_running_job(self.context_id()).is_some() {
            let pending = self.orchestrator.get_queue_summary(self.context_id()).pending;
            self.reply(&format!("📥 Queued {} ({} pending)", job.id, pending))
                .await;
        }

        let (orchestrator, _, channel) = self.handles();
        tokio::spawn(async move {
            orchestrator.start_job(&channel.context_id, &channel).await;
        });
    }

    fn handles(&self) -> (JobOrchestrator, Arc<dyn Notifier>, Arc<ChannelConfig>) {
        (
            self.orchestrator.clone(),
            self.notifier.clone(),
            self.channel.clone(),
        )
    }

    async fn reply(&self, text: &str) {
        post(&self.notifier, self.context_id(), text).await;
    }
}

async fn post(notifier: &Arc<dyn Notifier>, context_id: &str, text: &str) {
    if let Err(e) = notifier.post(context_id, text).await {
        warn!(context_id, "Failed to post reply: {}", e);
    }
}
