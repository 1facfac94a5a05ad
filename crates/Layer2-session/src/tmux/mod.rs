//! tmux session layer
//!
//! - `driver` - tmux 명령 실행 (세션 생성, 텍스트/키 전송, 캡처)
//! - `output` - 캡처 출력 정리 및 요약
//! - `detector` - 입력 대기 프롬프트 감지

pub mod detector;
pub mod driver;
pub mod output;

pub use detector::{
    detect_blocking_prompt, has_numbered_menu, has_selection_menu, has_yes_no_prompt,
    PromptDetection, PromptKind,
};
pub use driver::{DriverError, DriverResult, SessionDriver, TmuxDriver};
pub use output::{clean_output, process_capture, CaptureResult};
