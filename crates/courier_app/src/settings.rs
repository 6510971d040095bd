//! Application settings, read from a RON file next to the binary's working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_engine::{ProviderSettings, WorkerSettings};
use courier_logging::{LevelFilter, LogDestination};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SETTINGS_FILENAME: &str = "courier.ron";
pub const SETTINGS_ENV: &str = "COURIER_SETTINGS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogTarget {
    #[default]
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_target: LogTarget,
    pub log_level: String,
    /// User the local backend signs in on start; `None` runs signed out.
    pub user_id: Option<String>,
    pub worker: WorkerConfig,
    pub processor: ProcessorConfig,
    /// Completion providers, in fallback order.
    pub providers: Vec<ProviderEntry>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./courier_data"),
            log_file: PathBuf::from("./courier.log"),
            log_target: LogTarget::File,
            log_level: "info".to_string(),
            user_id: Some("local-user".to_string()),
            worker: WorkerConfig::default(),
            processor: ProcessorConfig::default(),
            providers: vec![
                ProviderEntry {
                    name: "openai".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    ..ProviderEntry::default()
                },
                ProviderEntry {
                    name: "groq".to_string(),
                    base_url: "https://api.groq.com/openai/v1".to_string(),
                    model: "llama-3.1-8b-instant".to_string(),
                    api_key_env: Some("GROQ_API_KEY".to_string()),
                    ..ProviderEntry::default()
                },
            ],
        }
    }
}

impl AppSettings {
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        let w = &self.worker;
        WorkerSettings {
            max_retries: w.max_retries,
            batch_size: w.batch_size,
            process_interval: Duration::from_millis(w.process_interval_ms),
            enqueue_debounce: Duration::from_millis(w.enqueue_debounce_ms),
            message_timeout: Duration::from_millis(w.message_timeout_ms),
            restart_backoff: Duration::from_millis(w.restart_backoff_ms),
            max_restart_backoff: Duration::from_millis(w.max_restart_backoff_ms),
            max_restarts: w.max_restarts,
        }
    }

    pub fn provider_settings(&self) -> Vec<ProviderSettings> {
        self.providers.iter().map(ProviderEntry::to_settings).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_retries: u32,
    pub batch_size: usize,
    pub process_interval_ms: u64,
    pub enqueue_debounce_ms: u64,
    pub message_timeout_ms: u64,
    pub restart_backoff_ms: u64,
    pub max_restart_backoff_ms: u64,
    pub max_restarts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let defaults = WorkerSettings::default();
        Self {
            max_retries: defaults.max_retries,
            batch_size: defaults.batch_size,
            process_interval_ms: millis(defaults.process_interval),
            enqueue_debounce_ms: millis(defaults.enqueue_debounce),
            message_timeout_ms: millis(defaults.message_timeout),
            restart_backoff_ms: millis(defaults.restart_backoff),
            max_restart_backoff_ms: millis(defaults.max_restart_backoff),
            max_restarts: defaults.max_restarts,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessorConfig {
    Simulated { delay_ms: u64, failure_rate: f64 },
    Completion,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig::Simulated {
            delay_ms: 100,
            failure_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            model: String::new(),
            api_key_env: None,
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout_secs: 60,
        }
    }
}

impl ProviderEntry {
    fn to_settings(&self) -> ProviderSettings {
        let mut settings =
            ProviderSettings::new(self.name.clone(), self.base_url.clone(), self.model.clone());
        settings.api_key_env = self.api_key_env.clone();
        settings.temperature = self.temperature;
        settings.max_tokens = self.max_tokens;
        settings.request_timeout = Duration::from_secs(self.request_timeout_secs);
        settings
    }
}

/// `$COURIER_SETTINGS` if set, else `./courier.ron`.
pub fn settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILENAME))
}

/// A missing file yields defaults; an unreadable or invalid one is an error.
pub fn load(path: &Path) -> Result<AppSettings, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    ron::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = load(&temp.path().join("absent.ron")).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.worker_settings().batch_size, 10);
        assert_eq!(settings.worker_settings().max_retries, 3);
        assert_eq!(
            settings.worker_settings().process_interval,
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("courier.ron");
        fs::write(
            &path,
            r#"(
                log_level: "debug",
                worker: (batch_size: 4, process_interval_ms: 250),
                processor: Completion,
                providers: [(name: "local", base_url: "http://localhost:11434/v1", model: "llama3")],
            )"#,
        )
        .unwrap();

        let settings = load(&path).unwrap();
        assert_eq!(settings.level_filter(), LevelFilter::Debug);
        assert_eq!(settings.processor, ProcessorConfig::Completion);
        let worker = settings.worker_settings();
        assert_eq!(worker.batch_size, 4);
        assert_eq!(worker.process_interval, Duration::from_millis(250));
        assert_eq!(worker.max_retries, 3);
        let providers = settings.provider_settings();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "local");
        assert_eq!(providers[0].max_tokens, 1024);
        assert_eq!(settings.user_id.as_deref(), Some("local-user"));
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("courier.ron");
        fs::write(&path, "(worker: [oops").unwrap();
        assert!(matches!(load(&path), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let settings = AppSettings {
            log_level: "chatty".to_string(),
            ..AppSettings::default()
        };
        assert_eq!(settings.level_filter(), LevelFilter::Info);
    }
}
