//! # tether-foundation
//!
//! Foundation layer for tether:
//! - Error: 공통 에러 타입
//! - Storage: JsonStore (설정, 채널, 세션 상태 파일)
//! - Config: TetherConfig 런타임 설정, ChannelRegistry

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    session_name_for, AgentConfig, ChannelConfig, ChannelRegistry, NotifyConfig, OutputConfig,
    ProgressConfig, RecoveryConfig, RetrySettings, TetherConfig, TimingConfig, CHANNELS_FILE,
    TETHER_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
