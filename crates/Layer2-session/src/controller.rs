//! Session Controller
//!
//! 드라이버 기본 동작을 에이전트 프로토콜로 묶는다:
//! 시작/재개 → 프롬프트 전송 → 출력 안정화 대기 → 프롬프트 감지 → 응답

use crate::dsl::{Key, ParsedSegment};
use crate::tmux::{detect_blocking_prompt, process_capture, CaptureResult, PromptDetection};
use crate::tmux::SessionDriver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tether_foundation::{AgentConfig, Error, OutputConfig, Result, TetherConfig, TimingConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 같은 캡처가 이만큼 연속으로 반복되면 안정
const REQUIRED_STABLE_POLLS: u32 = 2;

/// 빠른 상태 확인에 쓰는 스크롤백 줄 수
const QUICK_CAPTURE_START: i32 = -20;

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

/// 에이전트 시작 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStart {
    /// 이미 입력 대기 중
    AlreadyRunning,
    /// 이전 대화 이어서 시작
    Resumed,
    /// 새 대화로 시작
    Started,
}

/// yes/no 프롬프트 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Yes,
    No,
}

impl Response {
    pub fn as_str(&self) -> &'static str {
        match self {
            Response::Yes => "y",
            Response::No => "n",
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Response {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(Response::Yes),
            "n" | "no" => Ok(Response::No),
            other => Err(Error::InvalidInput(format!(
                "expected y or n, got '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// SessionController
// ============================================================================

pub struct SessionController {
    driver: Arc<dyn SessionDriver>,
    timing: TimingConfig,
    agent: AgentConfig,
    output: OutputConfig,
}

impl SessionController {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        timing: TimingConfig,
        agent: AgentConfig,
        output: OutputConfig,
    ) -> Self {
        Self {
            driver,
            timing,
            agent,
            output,
        }
    }

    pub fn from_config(driver: Arc<dyn SessionDriver>, config: &TetherConfig) -> Self {
        Self::new(
            driver,
            config.timing.clone(),
            config.agent.clone(),
            config.output.clone(),
        )
    }

    pub fn driver(&self) -> &Arc<dyn SessionDriver> {
        &self.driver
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn output_config(&self) -> &OutputConfig {
        &self.output
    }

    async fn quick_capture(&self, session: &str) -> Result<String> {
        Ok(self
            .driver
            .capture_pane(session, Some(QUICK_CAPTURE_START), None)
            .await?)
    }

    async fn submit_line(&self, session: &str, command: &str) -> Result<()> {
        self.driver.send_text(session, command, true).await?;
        self.driver.send_key(session, Key::Enter).await?;
        Ok(())
    }

    /// 에이전트 시작 (이미 실행 중이면 no-op)
    ///
    /// 재개 명령을 먼저 시도하고, 이어갈 대화가 없으면 새로 시작한다.
    pub async fn start_agent(&self, session: &str, cwd: &Path, force: bool) -> Result<AgentStart> {
        self.driver.ensure_session(session, cwd).await?;

        if !force {
            match self.quick_capture(session).await {
                Ok(screen) if self.agent.is_ready(&screen) => {
                    debug!(session, "Agent already running");
                    return Ok(AgentStart::AlreadyRunning);
                }
                Ok(_) => {}
                Err(e) => warn!(session, "Readiness check failed: {}", e),
            }
        }

        self.driver.clear_history(session).await?;
        info!(session, command = %self.agent.resume_command, "Resuming agent");
        self.submit_line(session, &self.agent.resume_command).await?;
        sleep_ms(self.timing.resume_settle_ms).await;

        let screen = self.quick_capture(session).await?;
        if !screen.trim().is_empty() && !screen.contains(&self.agent.no_conversation_marker) {
            info!(session, "Agent resumed previous conversation");
            return Ok(AgentStart::Resumed);
        }

        info!(session, command = %self.agent.start_command, "No conversation to resume, starting fresh");
        self.driver.clear_history(session).await?;
        self.submit_line(session, &self.agent.start_command).await?;
        sleep_ms(self.timing.fresh_start_settle_ms).await;

        let screen = self.quick_capture(session).await?;
        if self.agent.has_started(&screen) {
            info!(session, "Agent started");
            Ok(AgentStart::Started)
        } else {
            Err(Error::AgentStart(format!(
                "neither '{}' nor '{}' produced a ready agent in session {}",
                self.agent.resume_command, self.agent.start_command, session
            )))
        }
    }

    /// 프롬프트 전송 후 Enter 두 번으로 제출
    ///
    /// 여러 줄이면 bracketed paste 로 감싸 줄바꿈이 제출로 처리되지 않게 한다.
    pub async fn send_prompt(&self, session: &str, text: &str) -> Result<()> {
        info!(session, chars = text.chars().count(), "Sending prompt");

        if text.contains('\n') {
            let wrapped = format!("{}{}{}", PASTE_START, text, PASTE_END);
            self.driver.send_text(session, &wrapped, true).await?;
        } else {
            self.driver.send_text(session, text, true).await?;
        }

        self.driver.send_key(session, Key::Enter).await?;
        self.driver.send_key(session, Key::Enter).await?;
        sleep_ms(self.timing.submit_settle_ms).await;
        Ok(())
    }

    /// 보이는 화면 캡처 + 정리 + 앞/뒤 요약
    pub async fn capture_and_clean(&self, session: &str) -> Result<CaptureResult> {
        let raw = self.driver.capture_pane(session, None, None).await?;
        Ok(process_capture(
            &raw,
            self.output.head_lines,
            self.output.tail_lines,
        ))
    }

    /// 스크롤백 `scrollback` 줄을 포함해 캡처하고 마지막 `tail` 줄만 요약
    pub async fn capture_tail(
        &self,
        session: &str,
        scrollback: i32,
        tail: usize,
    ) -> Result<CaptureResult> {
        let raw = self
            .driver
            .capture_pane(session, Some(-scrollback.abs()), None)
            .await?;
        Ok(process_capture(&raw, 0, tail))
    }

    /// 출력이 안정될 때까지 폴링
    ///
    /// 정리된 캡처가 직전과 같으면 카운트를 올리고, 달라지면 0으로 되돌린다.
    /// `max_polls` 안에 안정되지 않거나 취소되면 `None`.
    pub async fn poll_until_stable(
        &self,
        session: &str,
        interval: Duration,
        max_polls: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<CaptureResult>> {
        info!(session, max_polls, interval_ms = interval.as_millis() as u64, "Polling output");

        let mut previous = String::new();
        let mut stable_count = 0;

        for poll in 0..max_polls {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                debug!(session, "Polling cancelled");
                return Ok(None);
            }

            let result = self.capture_and_clean(session).await?;

            if result.full_output == previous {
                stable_count += 1;
                debug!(session, "Output stable ({}/{})", stable_count, REQUIRED_STABLE_POLLS);
                if stable_count >= REQUIRED_STABLE_POLLS {
                    info!(session, polls = poll + 1, "Output is stable");
                    return Ok(Some(result));
                }
            } else {
                stable_count = 0;
            }
            previous = result.full_output;

            if poll + 1 < max_polls {
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!(session, "Polling cancelled");
                                return Ok(None);
                            }
                            _ = tokio::time::sleep(interval) => {}
                        }
                    }
                    None => tokio::time::sleep(interval).await,
                }
            }
        }

        warn!(session, max_polls, "Polling gave up before output stabilized");
        Ok(None)
    }

    pub fn detect_blocking_prompt(&self, output: &str) -> Option<PromptDetection> {
        detect_blocking_prompt(output)
    }

    /// y/n 전송 후 Enter
    pub async fn respond(&self, session: &str, response: Response) -> Result<()> {
        info!(session, %response, "Sending interactive response");
        self.driver.send_text(session, response.as_str(), true).await?;
        self.driver.send_key(session, Key::Enter).await?;
        Ok(())
    }

    /// 세그먼트를 순서대로 전송
    ///
    /// 단계 사이에 `key_delay_ms`, 마지막 단계 후 `sequence_settle_ms` 대기.
    /// 첫 실패에서 중단한다.
    pub async fn execute_sequence(&self, session: &str, segments: &[ParsedSegment]) -> Result<()> {
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                sleep_ms(self.timing.key_delay_ms).await;
            }
            let step = match segment {
                ParsedSegment::Key { key } => self.driver.send_key(session, *key).await,
                ParsedSegment::Text { content } => {
                    self.driver.send_text(session, content, true).await
                }
            };
            if let Err(e) = step {
                warn!(session, step = i + 1, "Sequence aborted: {}", e);
                return Err(e.into());
            }
        }

        sleep_ms(self.timing.sequence_settle_ms).await;
        debug!(session, steps = segments.len(), "Sequence executed");
        Ok(())
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
