use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;
pub const DEFAULT_CORRECTION_MAX_ROUNDS: u32 = 2;
pub const DEFAULT_CORRECTION_MAX_MERGED_MESSAGES: usize = 5;
pub const DEFAULT_KEEP_LAST_MESSAGES: usize = 30;
pub const DEFAULT_MAX_INPUT_TOKENS_APPROX: usize = 16_000;
pub const DEFAULT_LLM_RETRY_BUDGET: u32 = 2;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_CHAT_SEND_PER_RUN: u32 = 3;
pub const DEFAULT_STEP_BUDGET: u32 = 25;

/// `{ maxConcurrency, enableCorrectionMerge, correctionMaxRounds, correctionMaxMergedMessages }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "bool_true")]
    pub enable_correction_merge: bool,
    #[serde(default = "default_correction_max_rounds")]
    pub correction_max_rounds: u32,
    #[serde(default = "default_correction_max_merged_messages")]
    pub correction_max_merged_messages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            enable_correction_merge: true,
            correction_max_rounds: DEFAULT_CORRECTION_MAX_ROUNDS,
            correction_max_merged_messages: DEFAULT_CORRECTION_MAX_MERGED_MESSAGES,
        }
    }
}

/// `{ keepLastMessages, maxInputTokensApprox, archiveOnCompact }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompactionConfig {
    #[serde(default = "default_keep_last_messages")]
    pub keep_last_messages: usize,
    #[serde(default = "default_max_input_tokens_approx")]
    pub max_input_tokens_approx: usize,
    #[serde(default = "bool_true")]
    pub archive_on_compact: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_last_messages: DEFAULT_KEEP_LAST_MESSAGES,
            max_input_tokens_approx: DEFAULT_MAX_INPUT_TOKENS_APPROX,
            archive_on_compact: true,
        }
    }
}

/// Timeouts and retry budgets from the Concurrency & Resource Model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default = "default_llm_retry_budget")]
    pub llm_retry_budget: u32,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    #[serde(default = "default_max_chat_send_per_run")]
    pub max_chat_send_per_run: u32,
    #[serde(default = "default_step_budget")]
    pub step_budget: u32,
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            llm_retry_budget: DEFAULT_LLM_RETRY_BUDGET,
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            max_chat_send_per_run: DEFAULT_MAX_CHAT_SEND_PER_RUN,
            step_budget: DEFAULT_STEP_BUDGET,
            default_model: default_model(),
        }
    }
}

/// Top-level kernel config (`agentlane.toml` + `AGENTLANE_*` env overrides).
/// The daemon shell loads this; nothing under `agentlane-*` (besides this
/// type) reads the environment or a config file directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            scheduler: SchedulerConfig::default(),
            compaction: CompactionConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads config from an optional TOML file with `AGENTLANE_*` env var
    /// overrides, e.g. `AGENTLANE_SCHEDULER_MAX_CONCURRENCY=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let config: RuntimeConfig = Figment::from(figment::providers::Serialized::defaults(
            RuntimeConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("AGENTLANE_").split("_"))
        .extract()
        .map_err(|e| crate::error::AgentlaneError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn bool_true() -> bool {
    true
}
fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_correction_max_rounds() -> u32 {
    DEFAULT_CORRECTION_MAX_ROUNDS
}
fn default_correction_max_merged_messages() -> usize {
    DEFAULT_CORRECTION_MAX_MERGED_MESSAGES
}
fn default_keep_last_messages() -> usize {
    DEFAULT_KEEP_LAST_MESSAGES
}
fn default_max_input_tokens_approx() -> usize {
    DEFAULT_MAX_INPUT_TOKENS_APPROX
}
fn default_llm_retry_budget() -> u32 {
    DEFAULT_LLM_RETRY_BUDGET
}
fn default_step_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}
fn default_approval_timeout_secs() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}
fn default_max_chat_send_per_run() -> u32 {
    DEFAULT_MAX_CHAT_SEND_PER_RUN
}
fn default_step_budget() -> u32 {
    DEFAULT_STEP_BUDGET
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_root_dir() -> String {
    ".".to_string()
}
fn default_config_path() -> String {
    "agentlane.toml".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.scheduler.max_concurrency, 2);
        assert!(cfg.scheduler.enable_correction_merge);
        assert_eq!(cfg.scheduler.correction_max_rounds, 2);
        assert_eq!(cfg.scheduler.correction_max_merged_messages, 5);
        assert_eq!(cfg.compaction.keep_last_messages, 30);
        assert_eq!(cfg.compaction.max_input_tokens_approx, 16_000);
        assert!(cfg.compaction.archive_on_compact);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = RuntimeConfig::load(Some("/nonexistent/path/agentlane.toml")).unwrap();
        assert_eq!(cfg.scheduler.max_concurrency, 2);
    }
}
