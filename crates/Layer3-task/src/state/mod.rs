//! Session state - 컨텍스트별 응답 대기 상태 (state.json)
//!
//! - `store` - 파일 기반 저장소 (변경마다 전체 파일 재작성)
//! - `recovery` - 시작 시 복구와 주기적 타임아웃 정리

mod recovery;
mod store;

pub use recovery::{
    recover_state, start_periodic_sweep, sweep_timed_out_sessions, ChannelLookup,
    RecoverySummary, WaitExpiry,
};
pub use store::{SessionState, SessionStateStore, StateFile, StateSummary, STATE_FILE};
