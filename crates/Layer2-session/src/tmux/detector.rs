//! Blocking prompt detection
//!
//! 에이전트가 입력을 기다리는지 캡처 텍스트만 보고 판단한다.
//! 우선순위: yes/no → 선택 메뉴 → 번호 메뉴

use super::output::clean_output;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref YES_NO_PATTERNS: Vec<Regex> = [
        r"(?i)\[y/n\]",
        r"(?i)continue\?",
        r"(?i)proceed\?",
        r"(?i)do you want to",
        r"(?i)would you like to",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect();
    static ref EXPLICIT_YES_NO: Regex = Regex::new(r"(?i)\[y/n\]").expect("valid regex");
    static ref ARROW_LINE: Regex = Regex::new(r"(?m)^\s*>\s+").expect("valid regex");
    static ref NUMBERED_LINE: Regex = Regex::new(r"^\s*(\d+)[.)]\s+").expect("valid regex");
}

const CURSOR_GLYPH: char = '❯';
const YES_NO_WINDOW: usize = 5;
const MENU_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    YesNo,
    Selection,
    Numbered,
}

impl PromptKind {
    /// 응답 방법 안내
    pub fn suggested_response(&self) -> &'static str {
        match self {
            PromptKind::YesNo => "Reply with /y or /n",
            PromptKind::Selection => "Move with `u` / `d` and confirm with `e`",
            PromptKind::Numbered => "Send the option number, then `e`",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptKind::YesNo => write!(f, "yes/no"),
            PromptKind::Selection => write!(f, "selection"),
            PromptKind::Numbered => write!(f, "numbered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptDetection {
    pub kind: PromptKind,
    pub confidence: f32,
}

fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let from = lines.len().saturating_sub(n);
    lines[from..].to_vec()
}

/// 마지막 5줄에 yes/no 질문이 있는지
pub fn has_yes_no_prompt(output: &str) -> bool {
    let tail = last_lines(output, YES_NO_WINDOW).join("\n");
    YES_NO_PATTERNS.iter().any(|p| p.is_match(&tail))
}

/// 커서 글리프 또는 `>` 로 시작하는 줄
pub fn has_selection_menu(output: &str) -> bool {
    output.contains(CURSOR_GLYPH) || ARROW_LINE.is_match(output)
}

/// 마지막 10줄에 연속 번호(1. 2. / 1) 2)) 가 두 개 이상
///
/// 번호가 없는 줄은 건너뛰고, 번호가 끊기면 다시 센다.
pub fn has_numbered_menu(output: &str) -> bool {
    numbered_run(output) >= 2
}

fn numbered_run(output: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut last: Option<u64> = None;

    for line in last_lines(output, MENU_WINDOW) {
        let Some(n) = NUMBERED_LINE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        run = match last {
            Some(prev) if n == prev + 1 => run + 1,
            _ => 1,
        };
        last = Some(n);
        best = best.max(run);
    }
    best
}

fn confidence(kind: PromptKind, output: &str) -> f32 {
    let tail = last_lines(output, MENU_WINDOW).join("\n");
    match kind {
        PromptKind::YesNo => {
            if EXPLICIT_YES_NO.is_match(&tail) {
                0.95
            } else {
                0.85
            }
        }
        PromptKind::Selection => {
            if tail.contains(CURSOR_GLYPH) {
                0.9
            } else {
                0.8
            }
        }
        PromptKind::Numbered => {
            let count = tail
                .lines()
                .filter(|line| NUMBERED_LINE.is_match(line))
                .count();
            match count {
                c if c >= 5 => 0.9,
                c if c >= 3 => 0.85,
                _ => 0.8,
            }
        }
    }
}

/// 입력 대기 프롬프트 감지 (첫 번째로 맞는 종류)
pub fn detect_blocking_prompt(raw: &str) -> Option<PromptDetection> {
    let output = clean_output(raw);

    let kind = if has_yes_no_prompt(&output) {
        PromptKind::YesNo
    } else if has_selection_menu(&output) {
        PromptKind::Selection
    } else if has_numbered_menu(&output) {
        PromptKind::Numbered
    } else {
        return None;
    };

    Some(PromptDetection {
        kind,
        confidence: confidence(kind, &output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no_in_last_lines() {
        assert!(has_yes_no_prompt("Edited src/main.rs\nApply changes? [y/n]"));
        assert!(has_yes_no_prompt("Do you want to create hello.py?"));
        assert!(has_yes_no_prompt("Ready. Proceed?"));
    }

    #[test]
    fn test_yes_no_outside_window_ignored() {
        let output = format!("Continue? [y/n]\n{}", vec!["done"; 5].join("\n"));
        assert!(!has_yes_no_prompt(&output));
    }

    #[test]
    fn test_selection_markers() {
        assert!(has_selection_menu("Pick one:\n❯ Option A\n  Option B"));
        assert!(has_selection_menu("Pick one:\n  > Option A\n    Option B"));
        assert!(!has_selection_menu("a -> b\n>>> prompt"));
    }

    #[test]
    fn test_numbered_menu() {
        assert!(has_numbered_menu("Choose:\n1. Yes\n2. No"));
        assert!(has_numbered_menu("1) first\n(detail)\n2) second"));
        assert!(!has_numbered_menu("1. only one"));
        assert!(!has_numbered_menu("1. a\n3. b"));
        assert!(!has_numbered_menu("Version 2.0 released"));
    }

    #[test]
    fn test_priority_order() {
        let output = "1. Yes\n2. No\nDo you want to proceed?";
        let detection = detect_blocking_prompt(output).unwrap();
        assert_eq!(detection.kind, PromptKind::YesNo);

        let output = "❯ 1. Yes\n  2. No";
        assert_eq!(
            detect_blocking_prompt(output).unwrap().kind,
            PromptKind::Selection
        );

        let output = "Select:\n1. Yes\n2. No\n3. Later";
        let detection = detect_blocking_prompt(output).unwrap();
        assert_eq!(detection.kind, PromptKind::Numbered);
        assert_eq!(detection.confidence, 0.85);
    }

    #[test]
    fn test_confidence() {
        let detection = detect_blocking_prompt("Overwrite? [y/n]").unwrap();
        assert_eq!(detection.confidence, 0.95);
        let detection = detect_blocking_prompt("Would you like to continue").unwrap();
        assert_eq!(detection.confidence, 0.85);
    }

    #[test]
    fn test_plain_output_has_no_prompt() {
        let output = "\x1b[32m✓ Tests passed\x1b[0m\n\nAll 42 tests green.";
        assert!(detect_blocking_prompt(output).is_none());
    }
}
