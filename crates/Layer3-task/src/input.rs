//! 채팅 입력 분류
//!
//! 순서: 메타 명령 → 백틱 명령 → 일반 프롬프트

use crate::job::JobKind;
use tether_session::dsl;
use tether_session::Response;

/// 채팅 메타 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    Status,
    Help,
    Cancel,
    Respond(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Meta(MetaCommand),
    /// 백틱 키/텍스트 명령 (파싱 실패도 여기로 보내 에러를 알린다)
    Dsl(String),
    /// 에이전트에 보낼 프롬프트
    Prompt { kind: JobKind, text: String },
    Ignore,
}

fn meta_command(word: &str) -> Option<MetaCommand> {
    match word {
        "/status" => Some(MetaCommand::Status),
        "/help" => Some(MetaCommand::Help),
        "/cancel" | "/stop" => Some(MetaCommand::Cancel),
        "/y" | "/yes" => Some(MetaCommand::Respond(Response::Yes)),
        "/n" | "/no" => Some(MetaCommand::Respond(Response::No)),
        _ => None,
    }
}

pub fn classify_input(input: &str) -> InputAction {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return InputAction::Ignore;
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    let head = head.to_lowercase();

    if rest.is_empty() {
        if let Some(meta) = meta_command(&head) {
            return InputAction::Meta(meta);
        }
    }

    match head.as_str() {
        "/run" | "/ask" if rest.is_empty() => return InputAction::Meta(MetaCommand::Help),
        "/run" => {
            return InputAction::Prompt {
                kind: JobKind::RunSnippet,
                text: rest.to_string(),
            }
        }
        "/ask" => {
            return InputAction::Prompt {
                kind: JobKind::AskPrompt,
                text: rest.to_string(),
            }
        }
        _ => {}
    }

    if dsl::has_command_syntax(trimmed) {
        return InputAction::Dsl(trimmed.to_string());
    }

    InputAction::Prompt {
        kind: JobKind::AskPrompt,
        text: trimmed.to_string(),
    }
}
