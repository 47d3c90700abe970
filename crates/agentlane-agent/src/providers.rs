//! System-Prompt Providers: a sorted registry of contributors to the
//! assembled system prompt, tool whitelist and loaded-skill set for a run.
//!
//! Grounded on the teacher's `HookEngine` (sorted-priority registry,
//! fail-open dispatch) — same shape, generalized from event hooks to
//! system-prompt contribution and adapted to the aggregation rules in
//! SPEC_FULL §4.4 (concatenate messages, intersect `activeTools`, union
//! `loadedSkills`) rather than the hook engine's allow/block/modify gating.

use std::collections::HashSet;
use std::sync::RwLock;

use agentlane_core::SkillRecord;
use async_trait::async_trait;
use tracing::warn;

use crate::context::RunContext;

/// What one provider contributes to a run's system prompt.
#[derive(Debug, Clone, Default)]
pub struct ProviderOutput {
    pub messages: Vec<String>,
    /// `None` means "no constraint imposed by this provider".
    pub active_tools: Option<Vec<String>>,
    pub loaded_skills: Vec<SkillRecord>,
}

#[derive(Debug, thiserror::Error)]
#[error("system-prompt provider error: {0}")]
pub struct ProviderOutputError(pub String);

#[async_trait]
pub trait SystemPromptProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Ascending sort key; ties broken by `id`. Default matches SPEC_FULL's
    /// default of 1000.
    fn order(&self) -> i64 {
        1000
    }

    async fn provide(&self, ctx: &RunContext) -> Result<ProviderOutput, ProviderOutputError>;
}

struct Entry {
    provider: std::sync::Arc<dyn SystemPromptProvider>,
}

/// Result of aggregating every registered provider's output for one run.
#[derive(Debug, Clone, Default)]
pub struct AggregateOutput {
    pub messages: Vec<String>,
    pub active_tools: Option<HashSet<String>>,
    pub loaded_skills: Vec<SkillRecord>,
}

pub struct ProviderRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    /// Registers a provider and re-sorts by `(order, id)`. Stable so two
    /// providers registered at the same order keep insertion order beyond
    /// what the id tiebreak already guarantees.
    pub fn register(&self, provider: std::sync::Arc<dyn SystemPromptProvider>) {
        let mut entries = self.entries.write().unwrap();
        entries.push(Entry { provider });
        entries.sort_by(|a, b| {
            a.provider
                .order()
                .cmp(&b.provider.order())
                .then_with(|| a.provider.id().cmp(b.provider.id()))
        });
    }

    pub async fn aggregate(&self, ctx: &RunContext) -> AggregateOutput {
        let providers: Vec<_> = self.entries.read().unwrap().iter().map(|e| e.provider.clone()).collect();

        let mut out = AggregateOutput::default();
        let mut skills_by_id = std::collections::BTreeMap::new();

        for provider in providers {
            match provider.provide(ctx).await {
                Ok(output) => {
                    out.messages.extend(output.messages);
                    if let Some(declared) = output.active_tools {
                        let declared: HashSet<String> = declared.into_iter().collect();
                        out.active_tools = Some(match out.active_tools.take() {
                            Some(running) => running.intersection(&declared).cloned().collect(),
                            None => declared,
                        });
                    }
                    for skill in output.loaded_skills {
                        skills_by_id.insert(skill.id.clone(), skill);
                    }
                }
                Err(e) => {
                    warn!(provider = provider.id(), error = %e, "system-prompt provider failed, skipping");
                }
            }
        }

        out.loaded_skills = skills_by_id.into_values().collect();
        out
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
