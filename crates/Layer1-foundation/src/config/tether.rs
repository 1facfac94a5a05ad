//! Tether Config - 런타임 설정
//!
//! 모든 필드는 기본값을 가지므로 config.json 에는 바꾸려는 값만 적으면 된다.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const TETHER_CONFIG_FILE: &str = "config.json";

// ============================================================================
// Tether Config (통합)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherConfig {
    /// state.json 위치 (없으면 설정 디렉토리)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    pub timing: TimingConfig,
    pub agent: AgentConfig,
    pub progress: ProgressConfig,
    pub recovery: RecoveryConfig,
    pub notify: NotifyConfig,
    pub output: OutputConfig,
}

impl TetherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장소에서 로드 (파일이 없으면 기본값)
    pub fn load(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<TetherConfig>(TETHER_CONFIG_FILE)?
            .unwrap_or_default())
    }

    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(TETHER_CONFIG_FILE, self)
    }

    /// 세션 상태 파일 디렉토리
    pub fn state_dir_or(&self, fallback: &std::path::Path) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }
}

// ============================================================================
// Timing
// ============================================================================

/// 세션 제어 타이밍
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// execute-sequence 단계 사이 지연
    pub key_delay_ms: u64,
    /// execute-sequence 마지막 단계 후 지연
    pub sequence_settle_ms: u64,
    pub resume_settle_ms: u64,
    pub fresh_start_settle_ms: u64,
    pub submit_settle_ms: u64,
    /// DSL 실행 후 캡처 전 지연
    pub dsl_settle_ms: u64,
    pub command_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_polls: 120,
            key_delay_ms: 500,
            sequence_settle_ms: 500,
            resume_settle_ms: 2_000,
            fresh_start_settle_ms: 7_000,
            submit_settle_ms: 500,
            dsl_settle_ms: 500,
            command_timeout_ms: 30_000,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// 모든 지연을 0으로 (테스트용)
    pub fn immediate() -> Self {
        Self {
            poll_interval_ms: 0,
            max_polls: 120,
            key_delay_ms: 0,
            sequence_settle_ms: 0,
            resume_settle_ms: 0,
            fresh_start_settle_ms: 0,
            submit_settle_ms: 0,
            dsl_settle_ms: 0,
            command_timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

/// 세션 안에서 실행되는 코딩 에이전트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub resume_command: String,
    pub start_command: String,
    pub no_conversation_marker: String,
    /// `>` 와 함께 하나 이상 보이면 준비 완료
    pub ready_markers: Vec<String>,
    /// 새로 시작한 후 하나라도 보이면 성공
    pub started_markers: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            resume_command: "claude --continue".to_string(),
            start_command: "claude".to_string(),
            no_conversation_marker: "No conversation found to continue".to_string(),
            ready_markers: vec![
                "──────".to_string(),
                "claude.com".to_string(),
                "? for shortcuts".to_string(),
            ],
            started_markers: vec!["Claude Code".to_string(), "claude.com".to_string()],
        }
    }
}

impl AgentConfig {
    pub fn is_ready(&self, output: &str) -> bool {
        output.contains('>') && self.ready_markers.iter().any(|m| output.contains(m.as_str()))
    }

    pub fn has_started(&self, output: &str) -> bool {
        self.started_markers
            .iter()
            .any(|m| output.contains(m.as_str()))
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub timeout_secs: u64,
    pub window_lines: u32,
    pub max_session_failures: u32,
    pub max_channel_failures: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            timeout_secs: 3_600,
            window_lines: 50,
            max_session_failures: 5,
            max_channel_failures: 3,
        }
    }
}

impl ProgressConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Recovery
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryConfig {
    /// 응답 대기 타임아웃 (분)
    pub response_timeout_minutes: i64,
    /// 종료된 Job 보관 시간
    pub retention_hours: i64,
    pub sweep_interval_minutes: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            response_timeout_minutes: 30,
            retention_hours: 24,
            sweep_interval_minutes: 5,
        }
    }
}

impl RecoveryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes * 60)
    }
}

// ============================================================================
// Notify
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyConfig {
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub wrap_code_block: bool,
    pub retry: RetrySettings,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_500,
            chunk_delay_ms: 500,
            wrap_code_block: true,
            retry: RetrySettings::default(),
        }
    }
}

/// 알림 전송 재시도
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// 캡처 출력 요약 범위
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub head_lines: usize,
    pub tail_lines: usize,
    pub dsl_window_lines: usize,
    pub dsl_scrollback_lines: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            head_lines: 100,
            tail_lines: 80,
            dsl_window_lines: 30,
            dsl_scrollback_lines: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TetherConfig::new();
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.timing.max_polls, 120);
        assert_eq!(config.progress.max_session_failures, 5);
        assert_eq!(config.progress.max_channel_failures, 3);
        assert_eq!(config.recovery.response_timeout_minutes, 30);
        assert_eq!(config.notify.chunk_size, 2_500);
        assert_eq!(config.recovery.sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path());
        std::fs::write(
            store.file_path(TETHER_CONFIG_FILE),
            r#"{ "timing": { "maxPolls": 10 }, "progress": { "enabled": false } }"#,
        )
        .unwrap();

        let config = TetherConfig::load(&store).unwrap();
        assert_eq!(config.timing.max_polls, 10);
        assert_eq!(config.timing.poll_interval_ms, 5_000);
        assert!(!config.progress.enabled);
        assert_eq!(config.progress.interval_ms, 5_000);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path());
        let config = TetherConfig::load(&store).unwrap();
        assert!(config.state_dir.is_none());
        assert_eq!(config.agent.start_command, "claude");
    }

    #[test]
    fn test_agent_markers() {
        let agent = AgentConfig::default();
        assert!(agent.is_ready("╭──────╮\n│ > \n? for shortcuts"));
        assert!(!agent.is_ready("? for shortcuts"));
        assert!(!agent.is_ready("$ >"));
        assert!(agent.has_started("Welcome to Claude Code!"));
        assert!(!agent.has_started("bash: claude: command not found"));
    }

    #[test]
    fn test_state_dir_fallback() {
        let config = TetherConfig::new();
        let fallback = std::path::Path::new("/tmp/tether");
        assert_eq!(config.state_dir_or(fallback), fallback.to_path_buf());

        let config = TetherConfig::new().state_dir("/var/lib/tether");
        assert_eq!(
            config.state_dir_or(fallback),
            PathBuf::from("/var/lib/tether")
        );
    }
}
