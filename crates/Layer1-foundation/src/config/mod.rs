//! Config - 통합 설정 관리
//!
//! - `tether.rs` - TetherConfig 런타임 설정 (타이밍, 에이전트, 진행 상황, 복구, 알림)
//! - `channel.rs` - 컨텍스트별 채널 등록 (세션 이름, 프로젝트 경로)

mod channel;
mod tether;

pub use channel::{session_name_for, ChannelConfig, ChannelRegistry, CHANNELS_FILE};
pub use tether::{
    AgentConfig, NotifyConfig, OutputConfig, ProgressConfig, RecoveryConfig, RetrySettings,
    TetherConfig, TimingConfig, TETHER_CONFIG_FILE,
};
