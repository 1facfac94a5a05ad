//! # tether-session
//!
//! Terminal session layer:
//! - `dsl` - 백틱 명령 파서 (키/텍스트 세그먼트)
//! - `tmux` - tmux 드라이버, 출력 정리, 프롬프트 감지
//! - `controller` - 에이전트 시작, 프롬프트 전송, 출력 폴링, 응답

pub mod controller;
pub mod dsl;
pub mod tmux;

pub use controller::{AgentStart, Response, SessionController};
pub use dsl::{Key, ParseError, ParsedSegment};
pub use tmux::{
    clean_output, detect_blocking_prompt, process_capture, CaptureResult, DriverError,
    DriverResult, PromptDetection, PromptKind, SessionDriver, TmuxDriver,
};
