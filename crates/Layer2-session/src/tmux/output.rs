//! 캡처 출력 정리
//!
//! tmux 캡처에는 색상 코드, 커서 이동, 앞뒤 빈 줄이 섞여 있다.

use serde::{Deserialize, Serialize};

/// 정리된 캡처 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub full_output: String,
    pub summary: String,
    pub is_truncated: bool,
    pub total_lines: usize,
}

/// ANSI 시퀀스와 제어 문자를 제거하고 줄 끝 공백, 앞뒤 빈 줄을 정리
pub fn clean_output(raw: &str) -> String {
    let stripped = strip_ansi_escapes::strip_str(raw);
    let stripped: String = stripped
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let lines: Vec<&str> = stripped.split('\n').map(str::trim_end).collect();
    let Some(start) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(start);

    lines[start..=end].join("\n")
}

/// 앞 `head` 줄 + 뒤 `tail` 줄 요약
///
/// `head` 가 0이면 뒤 `tail` 줄만 요약으로 남긴다.
pub fn process_capture(raw: &str, head: usize, tail: usize) -> CaptureResult {
    let full_output = clean_output(raw);
    let lines: Vec<&str> = full_output.lines().collect();
    let total_lines = lines.len();

    if head == 0 {
        let from = total_lines.saturating_sub(tail);
        return CaptureResult {
            summary: lines[from..].join("\n"),
            is_truncated: total_lines > tail,
            total_lines,
            full_output,
        };
    }

    if total_lines <= head + tail {
        return CaptureResult {
            summary: full_output.clone(),
            is_truncated: false,
            total_lines,
            full_output,
        };
    }

    let omitted = total_lines - head - tail;
    let summary = format!(
        "{}\n\n... ({} lines omitted) ...\n\n{}",
        lines[..head].join("\n"),
        omitted,
        lines[total_lines - tail..].join("\n")
    );

    CaptureResult {
        full_output,
        summary,
        is_truncated: true,
        total_lines,
    }
}
