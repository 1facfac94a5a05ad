//! One-shot subcommands (channel, state, parse)
//!
//! 각 명령은 출력할 문자열을 만드는 함수와 그걸 출력하는 래퍼로 나뉜다.

use anyhow::{bail, Context};
use std::path::Path;
use tether_foundation::{ChannelConfig, ChannelRegistry, JsonStore, TetherConfig};
use tether_session::dsl;
use tether_task::SessionStateStore;

// ============================================================================
// channel
// ============================================================================

pub fn channel_add(
    store: JsonStore,
    context_id: &str,
    project_name: &str,
    path: &Path,
    session: Option<String>,
) -> anyhow::Result<()> {
    println!(
        "{}",
        add_channel(store, context_id, project_name, path, session)?
    );
    Ok(())
}

pub fn channel_remove(store: JsonStore, context_id: &str) -> anyhow::Result<()> {
    println!("{}", remove_channel(store, context_id)?);
    Ok(())
}

pub fn channel_list(store: JsonStore) -> anyhow::Result<()> {
    println!("{}", list_channels(store)?);
    Ok(())
}

fn add_channel(
    store: JsonStore,
    context_id: &str,
    project_name: &str,
    path: &Path,
    session: Option<String>,
) -> anyhow::Result<String> {
    let project_path = path
        .canonicalize()
        .with_context(|| format!("Project path not found: {}", path.display()))?;
    if !project_path.is_dir() {
        bail!("Project path is not a directory: {}", project_path.display());
    }

    let mut channel = ChannelConfig::new(context_id, project_name, project_path);
    if let Some(session) = session {
        channel = channel.with_session_name(session);
    }
    if !channel.is_valid() {
        bail!("Invalid channel config for {}", context_id);
    }

    let mut registry = ChannelRegistry::load(store)?;
    let message = format!(
        "Registered {} → {} ({}), session {}",
        channel.context_id,
        channel.project_name,
        channel.project_path.display(),
        channel.session_name
    );
    registry.register(channel)?;
    Ok(message)
}

fn remove_channel(store: JsonStore, context_id: &str) -> anyhow::Result<String> {
    let mut registry = ChannelRegistry::load(store)?;
    Ok(match registry.remove(context_id)? {
        Some(channel) => format!("Removed {} ({})", channel.context_id, channel.project_name),
        None => format!("No channel registered for {}", context_id),
    })
}

fn list_channels(store: JsonStore) -> anyhow::Result<String> {
    let registry = ChannelRegistry::load(store)?;
    if registry.is_empty() {
        return Ok("No channels registered".to_string());
    }
    let lines: Vec<String> = registry
        .list()
        .map(|c| {
            format!(
                "{}\t{}\t{}\tsession={}\tlast used {}",
                c.context_id,
                c.project_name,
                c.project_path.display(),
                c.session_name,
                c.last_used.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

// ============================================================================
// state
// ============================================================================

pub fn show_state(store: &JsonStore, config: &TetherConfig) -> anyhow::Result<()> {
    println!("{}", state_report(store, config)?);
    Ok(())
}

fn state_report(store: &JsonStore, config: &TetherConfig) -> anyhow::Result<String> {
    let state = SessionStateStore::open(config.state_dir_or(store.base_dir()));
    let summary = state.summary();

    let mut lines = vec![
        format!("State file: {}", state.path().display()),
        format!(
            "Sessions: {} (waiting: {}, timed out: {})",
            summary.total, summary.waiting, summary.timed_out
        ),
    ];
    for session in state.all_sessions() {
        let waiting = match session.timeout_at {
            Some(deadline) if session.is_waiting_for_response => {
                format!("waiting until {}", deadline.format("%Y-%m-%d %H:%M:%S"))
            }
            _ => "idle".to_string(),
        };
        lines.push(format!("• {} - {}", session.context_id, waiting));
        if let Some(prompt) = &session.last_prompt {
            lines.push(format!("  last prompt: {}", tether_task::job::preview(prompt, 80)));
        }
    }
    Ok(lines.join("\n"))
}

// ============================================================================
// parse
// ============================================================================

pub fn parse(text: &str) -> anyhow::Result<()> {
    println!("{}", parse_report(text)?);
    Ok(())
}

fn parse_report(text: &str) -> anyhow::Result<String> {
    match dsl::parse(text) {
        Ok(segments) => Ok(format!(
            "{}\n{}",
            serde_json::to_string_pretty(&segments)?,
            dsl::describe(&segments)
        )),
        Err(e) => Ok(tether_task::format::dsl_parse_error(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_channel_add_list_remove() {
        let config_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());

        let added = add_channel(store.clone(), "C123", "my-app", project.path(), None).unwrap();
        assert!(added.contains("session tether-C123"));

        let listed = list_channels(store.clone()).unwrap();
        assert!(listed.contains("C123\tmy-app"));

        let removed = remove_channel(store.clone(), "C123").unwrap();
        assert!(removed.starts_with("Removed C123"));
        assert_eq!(list_channels(store).unwrap(), "No channels registered");
    }

    #[test]
    fn test_channel_add_custom_session() {
        let config_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());

        let added = add_channel(
            store,
            "C1",
            "app",
            project.path(),
            Some("work".to_string()),
        )
        .unwrap();
        assert!(added.ends_with("session work"));
    }

    #[test]
    fn test_channel_add_rejects_missing_path() {
        let config_dir = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());
        let missing = config_dir.path().join("nope");

        assert!(add_channel(store, "C1", "app", &missing, None).is_err());
    }

    #[test]
    fn test_remove_unknown_channel() {
        let config_dir = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());
        assert_eq!(
            remove_channel(store, "ghost").unwrap(),
            "No channel registered for ghost"
        );
    }

    #[test]
    fn test_state_report_empty() {
        let config_dir = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());
        let report = state_report(&store, &TetherConfig::default()).unwrap();
        assert!(report.contains("Sessions: 0 (waiting: 0, timed out: 0)"));
    }

    #[test]
    fn test_state_report_lists_waiting_session() {
        let config_dir = TempDir::new().unwrap();
        let store = JsonStore::new(config_dir.path());
        let state = SessionStateStore::open(config_dir.path());
        state
            .begin_waiting("C1", chrono::Duration::minutes(30))
            .unwrap();
        state.set_last_prompt("C1", "refactor the parser").unwrap();

        let report = state_report(&store, &TetherConfig::default()).unwrap();
        assert!(report.contains("waiting: 1"));
        assert!(report.contains("• C1 - waiting until"));
        assert!(report.contains("last prompt: refactor the parser"));
    }

    #[test]
    fn test_parse_report() {
        let report = parse_report("`dd` my-app `e`").unwrap();
        assert!(report.contains("\"text\""));
        assert!(report.contains("my-app"));

        let error = parse_report("`ddx`").unwrap();
        assert!(error.contains("'x'"));
    }
}
