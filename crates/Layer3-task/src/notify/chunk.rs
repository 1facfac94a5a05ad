//! 긴 메시지 분할
//!
//! 채널 한 메시지에 담을 수 있도록 줄 단위로 자르고, 필요하면 코드 블록과
//! `[i/N]` 표시를 붙인다.

/// 코드 블록 + `[i/N]` 표시에 쓰는 여유분
const DECORATION_RESERVE: usize = 24;

#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub max_length: usize,
    pub wrap_code_block: bool,
    pub add_indicators: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_length: 2_500,
            wrap_code_block: true,
            add_indicators: true,
        }
    }
}

impl ChunkOptions {
    pub fn plain(max_length: usize) -> Self {
        Self {
            max_length,
            wrap_code_block: false,
            add_indicators: true,
        }
    }
}

/// 본문 안의 ``` 를 ''' 로 바꿔 코드 블록이 깨지지 않게 한다
pub fn convert_backticks(content: &str) -> String {
    content.replace("```", "'''")
}

/// 최대 `max_len` 문자 단위로 분할 (가능하면 마지막 줄바꿈 뒤에서 자름)
pub fn split_message(content: &str, max_len: usize) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);

    let mut parts = Vec::new();
    let mut rest = content;

    loop {
        let Some((limit, _)) = rest.char_indices().nth(max_len) else {
            parts.push(rest.to_string());
            break;
        };
        let window = &rest[..limit];
        let cut = match window.rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => limit,
        };
        parts.push(rest[..cut].to_string());
        rest = &rest[cut..];
        if rest.is_empty() {
            break;
        }
    }

    if parts.len() > 1 {
        tracing::debug!(parts = parts.len(), chars = content.chars().count(), "Message split");
    }
    parts
}

/// 두 개 이상이면 `[i/N]` 표시 추가
pub fn add_split_indicators(parts: Vec<String>) -> Vec<String> {
    if parts.len() <= 1 {
        return parts;
    }
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("[{}/{}]\n{}", i + 1, total, part))
        .collect()
}

/// 각 조각을 코드 블록으로 감싼다 (이미 감싸져 있으면 그대로)
pub fn wrap_in_code_blocks(parts: Vec<String>) -> Vec<String> {
    parts
        .into_iter()
        .map(|part| {
            if part.starts_with("```") && part.ends_with("```") && part.len() >= 6 {
                part
            } else {
                format!("```\n{}\n```", part.trim_end_matches('\n'))
            }
        })
        .collect()
}

/// 분할 → 코드 블록 → 표시
pub fn chunk_message(content: &str, options: &ChunkOptions) -> Vec<String> {
    let body = if options.wrap_code_block {
        convert_backticks(content)
    } else {
        content.to_string()
    };

    let budget = if options.wrap_code_block || options.add_indicators {
        options.max_length.saturating_sub(DECORATION_RESERVE)
    } else {
        options.max_length
    };

    let mut parts = split_message(&body, budget);
    if options.wrap_code_block {
        parts = wrap_in_code_blocks(parts);
    }
    if options.add_indicators {
        parts = add_split_indicators(parts);
    }
    parts
}
