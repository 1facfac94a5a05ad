//! Session controller 통합 테스트

mod common;

use common::{Call, FakeDriver};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_foundation::{AgentConfig, Error, OutputConfig, TimingConfig};
use tether_session::dsl;
use tether_session::{AgentStart, DriverError, Key, Response, SessionController};
use tokio_util::sync::CancellationToken;

fn controller(driver: &Arc<FakeDriver>, timing: TimingConfig) -> SessionController {
    SessionController::new(
        driver.clone(),
        timing,
        AgentConfig::default(),
        OutputConfig::default(),
    )
}

const READY_SCREEN: &str = "╭──────────╮\n│ >        │\n╰──────────╯\n  ? for shortcuts";

// ============================================================================
// execute_sequence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_down_sequence_timing() {
    let driver = Arc::new(FakeDriver::new());
    let controller = controller(&driver, TimingConfig::default());

    let segments = dsl::parse("`ddd`").unwrap();
    assert_eq!(segments.len(), 3);

    let started = tokio::time::Instant::now();
    controller.execute_sequence("s1", &segments).await.unwrap();
    let elapsed = started.elapsed();

    let calls = driver.timed_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, c)| *c == Call::Key(Key::Down)));
    assert_eq!(calls[1].0 - calls[0].0, Duration::from_millis(500));
    assert_eq!(calls[2].0 - calls[1].0, Duration::from_millis(500));
    // 마지막 단계 후 settle
    assert_eq!(elapsed, Duration::from_millis(1_500));
}

#[tokio::test]
async fn test_sequence_aborts_on_first_failure() {
    let driver = Arc::new(FakeDriver::new());
    driver.fail_text_with(DriverError::SessionMissing("s1".into()));
    let controller = controller(&driver, TimingConfig::immediate());

    let segments = dsl::parse("`d` hello `e`").unwrap();
    let err = controller.execute_sequence("s1", &segments).await.unwrap_err();

    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(
        driver.calls(),
        vec![Call::Key(Key::Down), Call::Text(" hello ".into())]
    );
}

// ============================================================================
// send_prompt / respond
// ============================================================================

#[tokio::test]
async fn test_single_line_prompt() {
    let driver = Arc::new(FakeDriver::new());
    let controller = controller(&driver, TimingConfig::immediate());

    controller.send_prompt("s1", "fix the build").await.unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            Call::Text("fix the build".into()),
            Call::Key(Key::Enter),
            Call::Key(Key::Enter),
        ]
    );
}

#[tokio::test]
async fn test_multi_line_prompt_uses_bracketed_paste() {
    let driver = Arc::new(FakeDriver::new());
    let controller = controller(&driver, TimingConfig::immediate());

    controller
        .send_prompt("s1", "first line\nsecond line")
        .await
        .unwrap();

    let texts = driver.texts();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0], "\x1b[200~first line\nsecond line\x1b[201~");
    let calls = driver.calls();
    assert_eq!(&calls[1..], &[Call::Key(Key::Enter), Call::Key(Key::Enter)]);
}

#[tokio::test]
async fn test_respond() {
    let driver = Arc::new(FakeDriver::new());
    let controller = controller(&driver, TimingConfig::immediate());

    controller.respond("s1", Response::No).await.unwrap();
    assert_eq!(
        driver.calls(),
        vec![Call::Text("n".into()), Call::Key(Key::Enter)]
    );
}

// ============================================================================
// start_agent
// ============================================================================

#[tokio::test]
async fn test_start_agent_already_running() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture(READY_SCREEN);
    let controller = controller(&driver, TimingConfig::immediate());

    let started = controller
        .start_agent("s1", Path::new("/srv/app"), false)
        .await
        .unwrap();

    assert_eq!(started, AgentStart::AlreadyRunning);
    assert!(driver.texts().is_empty());
}

#[tokio::test]
async fn test_start_agent_force_skips_ready_check() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("Welcome back, resuming conversation");
    let controller = controller(&driver, TimingConfig::immediate());

    let started = controller
        .start_agent("s1", Path::new("/srv/app"), true)
        .await
        .unwrap();

    assert_eq!(started, AgentStart::Resumed);
    assert_eq!(driver.texts(), vec!["claude --continue".to_string()]);
}

#[tokio::test]
async fn test_start_agent_resumes() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("user@host:~/app$");
    driver.push_capture("user@host:~/app$ claude --continue\n╭─── Claude Code ───╮");
    let controller = controller(&driver, TimingConfig::immediate());

    let started = controller
        .start_agent("s1", Path::new("/srv/app"), false)
        .await
        .unwrap();

    assert_eq!(started, AgentStart::Resumed);
    let calls = driver.calls();
    assert_eq!(calls[0], Call::Ensure);
    assert!(calls.contains(&Call::ClearHistory));
    assert_eq!(driver.texts(), vec!["claude --continue".to_string()]);
}

#[tokio::test]
async fn test_start_agent_falls_back_to_fresh_start() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("user@host:~/app$");
    driver.push_capture("No conversation found to continue");
    driver.push_capture("✻ Welcome to Claude Code!");
    let controller = controller(&driver, TimingConfig::immediate());

    let started = controller
        .start_agent("s1", Path::new("/srv/app"), false)
        .await
        .unwrap();

    assert_eq!(started, AgentStart::Started);
    assert_eq!(
        driver.texts(),
        vec!["claude --continue".to_string(), "claude".to_string()]
    );
    let clears = driver
        .calls()
        .iter()
        .filter(|c| **c == Call::ClearHistory)
        .count();
    assert_eq!(clears, 2);
}

#[tokio::test]
async fn test_start_agent_fails_when_nothing_starts() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("$");
    driver.push_capture("No conversation found to continue");
    driver.push_capture("bash: claude: command not found");
    let controller = controller(&driver, TimingConfig::immediate());

    let err = controller
        .start_agent("s1", Path::new("/srv/app"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AgentStart(_)));
}

// ============================================================================
// poll_until_stable
// ============================================================================

#[tokio::test]
async fn test_poll_needs_repeated_identical_captures() {
    let driver = Arc::new(FakeDriver::new());
    for screen in ["working", "done", "done", "done"] {
        driver.push_capture(screen);
    }
    let controller = controller(&driver, TimingConfig::immediate());

    let result = controller
        .poll_until_stable("s1", Duration::ZERO, 10, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.full_output, "done");
    assert_eq!(driver.capture_count(), 4);
}

#[tokio::test]
async fn test_poll_change_resets_stability() {
    let driver = Arc::new(FakeDriver::new());
    for screen in ["a", "a", "b", "b", "b"] {
        driver.push_capture(screen);
    }
    let controller = controller(&driver, TimingConfig::immediate());

    let result = controller
        .poll_until_stable("s1", Duration::ZERO, 10, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.full_output, "b");
    assert_eq!(driver.capture_count(), 5);
}

#[tokio::test]
async fn test_poll_ignores_ansi_only_differences() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("x");
    driver.push_capture("\x1b[1mready\x1b[0m");
    driver.push_capture("ready");
    driver.push_capture("ready  \n\n");
    let controller = controller(&driver, TimingConfig::immediate());

    let result = controller
        .poll_until_stable("s1", Duration::ZERO, 10, None)
        .await
        .unwrap();
    assert_eq!(result.unwrap().full_output, "ready");
    assert_eq!(driver.capture_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_poll_gives_up_after_max_polls() {
    let driver = Arc::new(FakeDriver::new());
    for i in 0..5 {
        driver.push_capture(format!("frame {}", i));
    }
    let controller = controller(&driver, TimingConfig::default());

    let started = tokio::time::Instant::now();
    let result = controller
        .poll_until_stable("s1", Duration::from_secs(5), 5, None)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(driver.capture_count(), 5);
    // 마지막 폴링 후에는 대기하지 않음
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test]
async fn test_poll_propagates_capture_failure() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("a");
    driver.push_capture_error(DriverError::SessionMissing("s1".into()));
    let controller = controller(&driver, TimingConfig::immediate());

    let err = controller
        .poll_until_stable("s1", Duration::ZERO, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
}

#[tokio::test(start_paused = true)]
async fn test_poll_stops_when_cancelled() {
    let driver = Arc::new(FakeDriver::new());
    driver.set_fallback("still changing?");
    for i in 0..3 {
        driver.push_capture(format!("frame {}", i));
    }
    let controller = controller(&driver, TimingConfig::default());
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            token.cancel();
        })
    };

    let result = controller
        .poll_until_stable("s1", Duration::from_secs(5), 120, Some(&token))
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(result.is_none());
    assert_eq!(driver.capture_count(), 2);
}

// ============================================================================
// capture
// ============================================================================

#[tokio::test]
async fn test_capture_tail_requests_scrollback() {
    let driver = Arc::new(FakeDriver::new());
    let lines: Vec<String> = (1..=40).map(|i| format!("row {}", i)).collect();
    driver.push_capture(lines.join("\n"));
    let controller = controller(&driver, TimingConfig::immediate());

    let result = controller.capture_tail("s1", 300, 30).await.unwrap();

    assert_eq!(driver.calls(), vec![Call::Capture(Some(-300))]);
    assert!(result.is_truncated);
    assert!(result.summary.starts_with("row 11"));
    assert!(result.summary.ends_with("row 40"));
}

#[tokio::test]
async fn test_detect_after_capture() {
    let driver = Arc::new(FakeDriver::new());
    driver.push_capture("Create file hello.py?\n\x1b[36m❯\x1b[0m 1. Yes\n  2. No");
    let controller = controller(&driver, TimingConfig::immediate());

    let capture = controller.capture_and_clean("s1").await.unwrap();
    let detection = controller
        .detect_blocking_prompt(&capture.full_output)
        .unwrap();
    assert_eq!(detection.kind, tether_session::PromptKind::Selection);
}
