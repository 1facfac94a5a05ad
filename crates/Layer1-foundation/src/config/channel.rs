//! Channel Registry - 컨텍스트별 세션/프로젝트 등록
//!
//! 컨텍스트 하나는 터미널 세션 하나와 작업 디렉토리 하나에 묶인다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 채널 파일명
pub const CHANNELS_FILE: &str = "channels.json";

/// 컨텍스트 ID로부터 tmux 세션 이름 생성
///
/// tmux 가 세션 이름에서 허용하지 않는 `.`, `:`, 공백은 `-` 로 바꾼다.
pub fn session_name_for(context_id: &str) -> String {
    let sanitized: String = context_id
        .chars()
        .map(|c| match c {
            '.' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect();
    format!("tether-{}", sanitized)
}

/// 채널(컨텍스트) 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub context_id: String,
    pub project_name: String,
    pub project_path: PathBuf,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl ChannelConfig {
    pub fn new(
        context_id: impl Into<String>,
        project_name: impl Into<String>,
        project_path: impl Into<PathBuf>,
    ) -> Self {
        let context_id = context_id.into();
        let now = Utc::now();
        Self {
            session_name: session_name_for(&context_id),
            context_id,
            project_name: project_name.into(),
            project_path: project_path.into(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// 세션 이름과 프로젝트 경로가 모두 있어야 유효
    pub fn is_valid(&self) -> bool {
        !self.session_name.trim().is_empty() && !self.project_path.as_os_str().is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChannelFile {
    #[serde(default)]
    channels: BTreeMap<String, ChannelConfig>,
}

/// channels.json 기반 채널 레지스트리
#[derive(Debug)]
pub struct ChannelRegistry {
    store: JsonStore,
    channels: BTreeMap<String, ChannelConfig>,
}

impl ChannelRegistry {
    /// 로드 (파일이 없으면 비어있는 레지스트리)
    pub fn load(store: JsonStore) -> Result<Self> {
        let file: ChannelFile = store.load_optional(CHANNELS_FILE)?.unwrap_or_default();
        Ok(Self {
            store,
            channels: file.channels,
        })
    }

    fn persist(&self) -> Result<()> {
        let file = ChannelFile {
            channels: self.channels.clone(),
        };
        self.store.save(CHANNELS_FILE, &file)
    }

    pub fn get(&self, context_id: &str) -> Option<&ChannelConfig> {
        self.channels.get(context_id)
    }

    pub fn contains(&self, context_id: &str) -> bool {
        self.channels.contains_key(context_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// 등록 (같은 컨텍스트는 덮어씀)
    pub fn register(&mut self, config: ChannelConfig) -> Result<()> {
        if !config.is_valid() {
            return Err(Error::InvalidInput(format!(
                "channel {} needs a session name and a project path",
                config.context_id
            )));
        }
        tracing::info!(
            context_id = %config.context_id,
            session = %config.session_name,
            "Registered channel"
        );
        self.channels.insert(config.context_id.clone(), config);
        self.persist()
    }

    pub fn remove(&mut self, context_id: &str) -> Result<Option<ChannelConfig>> {
        let removed = self.channels.remove(context_id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// 마지막 사용 시각 갱신
    pub fn touch(&mut self, context_id: &str) -> Result<()> {
        let channel = self
            .channels
            .get_mut(context_id)
            .ok_or_else(|| Error::NotFound(format!("channel {}", context_id)))?;
        channel.last_used = Utc::now();
        self.persist()
    }
}
