use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    Provider,
    Personality,
    Interface,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 3] = [
        ConfigKind::Provider,
        ConfigKind::Personality,
        ConfigKind::Interface,
    ];

    /// Remote table backing this slice.
    pub fn table(self) -> &'static str {
        match self {
            ConfigKind::Provider => "ai_provider_settings",
            ConfigKind::Personality => "ai_personality_settings",
            ConfigKind::Interface => "ai_interface_settings",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfigKind::Provider => "provider",
            ConfigKind::Personality => "personality",
            ConfigKind::Interface => "interface",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl ProviderConfig {
    /// Parses and normalizes `base_url`; `None` if it is not an absolute http(s) URL.
    pub fn normalized_base_url(&self) -> Option<String> {
        let parsed = Url::parse(self.base_url.trim()).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        Some(parsed.as_str().trim_end_matches('/').to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    pub name: String,
    pub tone: String,
    pub instructions: Vec<String>,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            tone: "friendly".to_string(),
            instructions: Vec::new(),
        }
    }
}

impl PersonalityConfig {
    /// System prompt prefix sent ahead of every chat message.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}, an AI assistant. Respond in a {} tone.",
            self.name.trim(),
            self.tone.trim()
        );
        for instruction in self
            .instructions
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
        {
            prompt.push_str("\n- ");
            prompt.push_str(instruction);
        }
        prompt
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    pub theme: String,
    pub show_timestamps: bool,
    pub compact: bool,
    pub notifications: bool,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            show_timestamps: true,
            compact: false,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Provider(ProviderConfig),
    Personality(PersonalityConfig),
    Interface(InterfaceConfig),
}

impl ConfigValue {
    pub fn kind(&self) -> ConfigKind {
        match self {
            ConfigValue::Provider(_) => ConfigKind::Provider,
            ConfigValue::Personality(_) => ConfigKind::Personality,
            ConfigValue::Interface(_) => ConfigKind::Interface,
        }
    }
}

/// One independently persisted configuration slice.
///
/// `value` is what readers consult. Local writes land immediately and leave
/// the slice `dirty` until the backend confirms the matching revision; a
/// failed write keeps the local value and records the error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSlice<T> {
    value: T,
    synced: T,
    loading: bool,
    error: Option<String>,
    dirty: bool,
    revision: u64,
}

impl<T: Clone> ConfigSlice<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Last value known to match the backend.
    pub fn synced(&self) -> &T {
        &self.synced
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.loading = true;
    }

    /// Remote value replaces the local one unless local edits are still unsynced.
    pub(crate) fn apply_fetched(&mut self, value: T) {
        self.loading = false;
        self.synced = value.clone();
        if self.dirty {
            return;
        }
        self.value = value;
        self.error = None;
    }

    pub(crate) fn apply_missing(&mut self) {
        self.loading = false;
        self.error = None;
    }

    pub(crate) fn fail_fetch(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }

    pub(crate) fn set_local(&mut self, value: T) -> u64 {
        self.value = value;
        self.dirty = true;
        self.revision += 1;
        self.revision
    }

    /// Only the latest revision clears `dirty`; older confirmations are stale.
    pub(crate) fn mark_persisted(&mut self, revision: u64) -> bool {
        if revision != self.revision {
            return false;
        }
        self.synced = self.value.clone();
        self.dirty = false;
        self.error = None;
        true
    }

    pub(crate) fn fail_persist(&mut self, revision: u64, error: String) -> bool {
        if revision != self.revision {
            return false;
        }
        self.error = Some(error);
        true
    }

    /// Restores the synced value as a new revision. The slice stays dirty until
    /// that revision is written back, since an older write may still land.
    pub(crate) fn revert(&mut self) -> u64 {
        let synced = self.synced.clone();
        self.error = None;
        self.set_local(synced)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AiConfigState {
    pub provider: ConfigSlice<ProviderConfig>,
    pub personality: ConfigSlice<PersonalityConfig>,
    pub interface: ConfigSlice<InterfaceConfig>,
}

impl AiConfigState {
    pub fn error(&self, kind: ConfigKind) -> Option<&str> {
        match kind {
            ConfigKind::Provider => self.provider.error(),
            ConfigKind::Personality => self.personality.error(),
            ConfigKind::Interface => self.interface.error(),
        }
    }

    pub fn is_dirty(&self, kind: ConfigKind) -> bool {
        match kind {
            ConfigKind::Provider => self.provider.is_dirty(),
            ConfigKind::Personality => self.personality.is_dirty(),
            ConfigKind::Interface => self.interface.is_dirty(),
        }
    }

    /// Current local value of one slice together with its revision.
    pub fn current(&self, kind: ConfigKind) -> (ConfigValue, u64) {
        match kind {
            ConfigKind::Provider => (
                ConfigValue::Provider(self.provider.value().clone()),
                self.provider.revision(),
            ),
            ConfigKind::Personality => (
                ConfigValue::Personality(self.personality.value().clone()),
                self.personality.revision(),
            ),
            ConfigKind::Interface => (
                ConfigValue::Interface(self.interface.value().clone()),
                self.interface.revision(),
            ),
        }
    }
}
