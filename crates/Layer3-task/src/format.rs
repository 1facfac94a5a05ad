//! 채널 메시지 포맷
//!
//! 모든 사용자 메시지는 여기서 만든다. 긴 출력은 호출 측에서
//! `notify::post_chunked`로 따로 보낸다.

use crate::job::{preview, Job};
use crate::progress::ProgressStatus;
use crate::queue::QueueSummary;
use chrono::Duration;
use tether_session::{CaptureResult, ParseError, PromptKind};

/// 시작 메시지의 프롬프트 미리보기 길이
pub const PROMPT_PREVIEW_CHARS: usize = 200;

/// 진행 메시지 한 건에 넣을 출력 최대 길이
pub const PROGRESS_OUTPUT_CHARS: usize = 1_800;

// ============================================================================
// Helpers
// ============================================================================

/// `1m 05s` 형식
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text.replace("```", "'''"))
}

/// 마지막 `max_chars` 문자만 남긴다
fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((i, _)) => &text[i..],
        None => text,
    }
}

// ============================================================================
// Job lifecycle
// ============================================================================

pub fn job_started(job: &Job, project_name: &str) -> String {
    let chars = job.payload.chars().count();
    let length_note = if chars > PROMPT_PREVIEW_CHARS {
        format!(" ({} chars, first {} shown)", chars, PROMPT_PREVIEW_CHARS)
    } else {
        String::new()
    };
    format!(
        "🔄 Job started\nJob: {}\nProject: {}\nType: {}\nInput{}:\n{}",
        job.id,
        project_name,
        job.kind.display_name(),
        length_note,
        code_block(&preview(&job.payload, PROMPT_PREVIEW_CHARS)),
    )
}

/// 완료 헤더 (출력은 따로 전송)
pub fn job_completed(job: &Job, result: &CaptureResult) -> String {
    let mut message = format!("✅ Job completed\nJob: {}", job.id);
    if let Some(elapsed) = job.elapsed() {
        message.push_str(&format!("\nElapsed: {}", format_elapsed(elapsed)));
    }
    message.push_str(&format!("\nOutput lines: {}", result.total_lines));
    if result.is_truncated {
        message.push_str(" (middle omitted)");
    }
    message
}

pub fn job_failed(job: &Job, error: &str) -> String {
    format!("❌ Job failed\nJob: {}\nError:\n{}", job.id, code_block(error))
}

pub fn job_cancelled(job: &Job) -> String {
    format!("🚫 Job cancelled\nJob: {}", job.id)
}

// ============================================================================
// DSL
// ============================================================================

pub fn dsl_completed(job: &Job, steps: usize, result: &CaptureResult) -> String {
    format!(
        "✅ Key command completed\nJob: {}\nSteps: {}\nScreen lines: {}",
        job.id, steps, result.total_lines
    )
}

pub fn dsl_parse_error(error: &ParseError) -> String {
    [
        "❌ Mixed characters in key command".to_string(),
        String::new(),
        format!("Group: `{}`", error.group),
        format!("Key characters: {}", error.key_chars_quoted()),
        format!("Other characters: {}", error.other_chars_quoted()),
        String::new(),
        "Fix: put keys and text in separate backtick groups".to_string(),
        "Right: `ddd` text `e`".to_string(),
        "Wrong: `dddtext`".to_string(),
    ]
    .join("\n")
}

pub fn dsl_guide() -> String {
    [
        "💡 Key commands",
        "",
        "Wrap keys or text in backticks:",
        "• `ddd` → Down ×3",
        "• `uuu` → Up ×3",
        "• `e` → Enter",
        "• `r`, `l` → Right, Left",
        "• `s` → Space",
        "• `my-app` → types \"my-app\"",
        "• `ddd` my-app `e` → Down ×3, \"my-app\", Enter",
        "",
        "⚠️ Key characters (r, l, u, d, e, s) cannot share a backtick group with other characters.",
    ]
    .join("\n")
}

pub fn prompt_help(kind: PromptKind) -> String {
    let lines: &[&str] = match kind {
        PromptKind::YesNo => &[
            "💡 A [y/n] prompt is waiting.",
            "",
            "• /y - Yes",
            "• /n - No",
        ],
        PromptKind::Selection => &[
            "💡 A selection menu is waiting.",
            "",
            "• `u` / `d` - move up / down",
            "• `l` / `r` - move left / right",
            "• `e` - confirm",
            "",
            "Example: `ddd` then `e`",
        ],
        PromptKind::Numbered => &[
            "💡 Numbered options are waiting.",
            "",
            "• send the option number, then `e`",
            "",
            "Example: `2` then `e`",
        ],
    };
    lines.join("\n")
}

// ============================================================================
// Progress
// ============================================================================

pub fn progress_starting() -> String {
    "⏳ Starting job...".to_string()
}

pub fn progress_update(elapsed: Duration, output: &str) -> String {
    let mut message = format!("🔄 Working... (elapsed {})", format_elapsed(elapsed));
    let output = output.trim();
    if !output.is_empty() {
        message.push_str("\n\n");
        message.push_str(&code_block(tail_chars(output, PROGRESS_OUTPUT_CHARS)));
    }
    message
}

pub fn progress_final(status: &ProgressStatus, elapsed: Duration, output: Option<&str>) -> String {
    let elapsed = format_elapsed(elapsed);
    let mut message = match status {
        ProgressStatus::InProgress => format!("🔄 Working... (elapsed {})", elapsed),
        ProgressStatus::Completed => format!("✅ Done (total {})", elapsed),
        ProgressStatus::Failed(error) => format!("❌ Failed: {}", error),
        ProgressStatus::Cancelled => format!("🚫 Cancelled after {}", elapsed),
        ProgressStatus::Waiting => "⏳ Waiting for your input...".to_string(),
    };
    if let Some(output) = output.map(str::trim).filter(|o| !o.is_empty()) {
        message.push_str("\n\n");
        message.push_str(&code_block(tail_chars(output, PROGRESS_OUTPUT_CHARS)));
    }
    message
}

pub fn progress_timeout(limit: std::time::Duration) -> String {
    let secs = limit.as_secs();
    let limit = if secs >= 60 {
        format!("{} min", secs / 60)
    } else {
        format!("{} s", secs)
    };
    format!("⏰ Job exceeded the time limit ({}); progress updates stopped", limit)
}

pub fn progress_session_error(failures: u32) -> String {
    format!(
        "❌ Lost the terminal session ({} capture failures in a row); progress updates stopped",
        failures
    )
}

// ============================================================================
// Status / help
// ============================================================================

pub fn queue_status(context_id: &str, running: Option<&Job>, summary: &QueueSummary) -> String {
    let mut lines = vec![format!("📋 Queue for {}", context_id)];
    match running {
        Some(job) => {
            let elapsed = job.elapsed().map(format_elapsed).unwrap_or_default();
            lines.push(format!(
                "Running: {} {} ({}) {}",
                job.id,
                job.kind.display_name(),
                elapsed,
                preview(&job.payload, 60)
            ));
        }
        None => lines.push("Running: none".to_string()),
    }
    lines.push(format!(
        "Pending: {} · Completed: {} · Failed: {} · Cancelled: {}",
        summary.pending, summary.completed, summary.failed, summary.cancelled
    ));
    lines.join("\n")
}

pub fn help() -> String {
    [
        "tether commands",
        "",
        "• any text → sent to the agent as a prompt",
        "• `keys` and text → key command (see below)",
        "• /status → queue status",
        "• /cancel → cancel the running job",
        "• /y, /n → answer a yes/no prompt",
        "• /help → this message",
        "",
    ]
    .join("\n")
        + &dsl_guide()
}
