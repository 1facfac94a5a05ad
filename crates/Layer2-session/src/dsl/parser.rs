//! Backtick command parser
//!
//! 백틱 그룹의 내용이 전부 키 문자면 키 입력, 하나도 없으면 텍스트.
//! 섞여 있으면 전체 파싱이 실패한다.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref BACKTICK_GROUP: Regex = Regex::new(r"`([^`]+)`").expect("valid regex");
}

// ============================================================================
// Key
// ============================================================================

/// 단일 문자 코드로 보낼 수 있는 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Right,
    Left,
    Up,
    Down,
    Enter,
    Space,
}

impl Key {
    pub const ALL: [Key; 6] = [
        Key::Right,
        Key::Left,
        Key::Up,
        Key::Down,
        Key::Enter,
        Key::Space,
    ];

    pub fn from_code(c: char) -> Option<Key> {
        match c {
            'r' => Some(Key::Right),
            'l' => Some(Key::Left),
            'u' => Some(Key::Up),
            'd' => Some(Key::Down),
            'e' => Some(Key::Enter),
            's' => Some(Key::Space),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Key::Right => 'r',
            Key::Left => 'l',
            Key::Up => 'u',
            Key::Down => 'd',
            Key::Enter => 'e',
            Key::Space => 's',
        }
    }

    /// tmux send-keys 키 이름
    pub fn tmux_name(self) -> &'static str {
        match self {
            Key::Right => "Right",
            Key::Left => "Left",
            Key::Up => "Up",
            Key::Down => "Down",
            Key::Enter => "Enter",
            Key::Space => "Space",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tmux_name())
    }
}

// ============================================================================
// Segment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParsedSegment {
    Key { key: Key },
    Text { content: String },
}

impl ParsedSegment {
    pub fn key(key: Key) -> Self {
        ParsedSegment::Key { key }
    }

    pub fn text(content: impl Into<String>) -> Self {
        ParsedSegment::Text {
            content: content.into(),
        }
    }
}

// ============================================================================
// Error
// ============================================================================

/// 한 백틱 그룹 안에 키 문자와 일반 문자가 섞인 경우
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub group: String,
    pub key_chars: Vec<char>,
    pub other_chars: Vec<char>,
}

fn quote_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ParseError {
    pub fn key_chars_quoted(&self) -> String {
        quote_chars(&self.key_chars)
    }

    pub fn other_chars_quoted(&self) -> String {
        quote_chars(&self.other_chars)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ambiguous command `{}`: {} are key characters but {} are not",
            self.group,
            self.key_chars_quoted(),
            self.other_chars_quoted()
        )
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for tether_foundation::Error {
    fn from(e: ParseError) -> Self {
        tether_foundation::Error::Parse(e.to_string())
    }
}

// ============================================================================
// Parse
// ============================================================================

/// 입력에 백틱 그룹 문법이 쓰였는지
pub fn has_command_syntax(input: &str) -> bool {
    input.contains('`')
}

fn classify_group(group: &str, out: &mut Vec<ParsedSegment>) -> Result<(), ParseError> {
    let (key_chars, other_chars): (Vec<char>, Vec<char>) =
        group.chars().partition(|c| Key::from_code(*c).is_some());

    if other_chars.is_empty() {
        out.extend(
            key_chars
                .iter()
                .filter_map(|c| Key::from_code(*c))
                .map(ParsedSegment::key),
        );
        return Ok(());
    }
    if key_chars.is_empty() {
        out.push(ParsedSegment::text(group));
        return Ok(());
    }

    Err(ParseError {
        group: group.to_string(),
        key_chars,
        other_chars,
    })
}

fn push_free_text(text: &str, out: &mut Vec<ParsedSegment>) {
    if !text.trim().is_empty() {
        out.push(ParsedSegment::text(text));
    }
}

/// 입력 문자열을 키/텍스트 세그먼트로 분해
///
/// 그룹 밖의 텍스트는 공백만 있는 경우를 제외하고 그대로 보존한다.
pub fn parse(input: &str) -> Result<Vec<ParsedSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in BACKTICK_GROUP.captures_iter(input) {
        let (Some(whole), Some(group)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_free_text(&input[cursor..whole.start()], &mut segments);
        if let Err(e) = classify_group(group.as_str(), &mut segments) {
            tracing::debug!("Parse error: {}", e);
            return Err(e);
        }
        cursor = whole.end();
    }
    push_free_text(&input[cursor..], &mut segments);

    tracing::debug!("Parsed {} command segments", segments.len());
    Ok(segments)
}

/// 세그먼트 요약 (연속된 같은 키는 묶음)
///
/// `Down ×3, "my-app", Enter`
pub fn describe(segments: &[ParsedSegment]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run: Option<(Key, usize)> = None;

    let flush = |run: &mut Option<(Key, usize)>, parts: &mut Vec<String>| {
        if let Some((key, count)) = run.take() {
            if count > 1 {
                parts.push(format!("{} ×{}", key, count));
            } else {
                parts.push(key.to_string());
            }
        }
    };

    for segment in segments {
        match segment {
            ParsedSegment::Key { key } => {
                if let Some((current, count)) = run.as_mut() {
                    if *current == *key {
                        *count += 1;
                        continue;
                    }
                }
                flush(&mut run, &mut parts);
                run = Some((*key, 1));
            }
            ParsedSegment::Text { content } => {
                flush(&mut run, &mut parts);
                parts.push(format!("\"{}\"", content.trim()));
            }
        }
    }
    flush(&mut run, &mut parts);

    parts.join(", ")
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_only_group() {
        let segments = parse("`ddd`").unwrap();
        assert_eq!(segments, vec![ParsedSegment::key(Key::Down); 3]);
    }

    #[test]
    fn test_every_key_code() {
        let segments = parse("`rludes`").unwrap();
        let keys: Vec<Key> = segments
            .iter()
            .map(|s| match s {
                ParsedSegment::Key { key } => *key,
                other => panic!("unexpected segment {:?}", other),
            })
            .collect();
        assert_eq!(keys, Key::ALL.to_vec());
    }

    #[test]
    fn test_text_group() {
        let segments = parse("`console.log()`").unwrap();
        assert_eq!(segments, vec![ParsedSegment::text("console.log()")]);
    }

    #[test]
    fn test_mixed_with_free_text() {
        let segments = parse("`ddd` text `e`").unwrap();
        assert_eq!(
            segments,
            vec![
                ParsedSegment::key(Key::Down),
                ParsedSegment::key(Key::Down),
                ParsedSegment::key(Key::Down),
                ParsedSegment::text(" text "),
                ParsedSegment::key(Key::Enter),
            ]
        );
    }

    #[test]
    fn test_whitespace_between_groups_dropped() {
        let segments = parse("`u`   `e`").unwrap();
        assert_eq!(
            segments,
            vec![ParsedSegment::key(Key::Up), ParsedSegment::key(Key::Enter)]
        );
    }

    #[test]
    fn test_ambiguous_group_fails() {
        let err = parse("`ddd` then `ddx`").unwrap_err();
        assert_eq!(err.group, "ddx");
        assert_eq!(err.key_chars, vec!['d', 'd']);
        assert_eq!(err.other_chars, vec!['x']);

        let message = err.to_string();
        assert!(message.contains("'d', 'd'"));
        assert!(message.contains("'x'"));
    }

    #[test]
    fn test_uppercase_is_not_a_key() {
        assert_eq!(parse("`DDD`").unwrap(), vec![ParsedSegment::text("DDD")]);
        assert!(parse("`Done`").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   \n ").unwrap().is_empty());
    }

    #[test]
    fn test_unmatched_backtick_is_text() {
        let segments = parse("`e` and `unterminated").unwrap();
        assert_eq!(
            segments,
            vec![
                ParsedSegment::key(Key::Enter),
                ParsedSegment::text(" and `unterminated"),
            ]
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let input = "`dd` deploy `e`";
        assert_eq!(parse(input), parse(input));
        assert_eq!(input, "`dd` deploy `e`");
    }

    #[test]
    fn test_describe() {
        let segments = parse("`ddd` my-app `e`").unwrap();
        assert_eq!(describe(&segments), "Down ×3, \"my-app\", Enter");
        assert_eq!(describe(&[]), "");
    }

    #[test]
    fn test_segment_json_shape() {
        let json = serde_json::to_string(&ParsedSegment::key(Key::Up)).unwrap();
        assert_eq!(json, r#"{"type":"key","key":"Up"}"#);
        let json = serde_json::to_string(&ParsedSegment::text("hi")).unwrap();
        assert_eq!(json, r#"{"type":"text","content":"hi"}"#);
    }
}
