//! Skill loading (SPEC_FULL §4.5): `skill_load(idOrName)` reads a SKILL.md
//! document out of the workspace skills directory, adds it to the run's
//! loaded-skills map, and pins it into the chat's `MessagesMeta` so future
//! runs on the same chatKey keep seeing it without reloading.
//!
//! Trimmed from the teacher's dual-directory (user + workspace) loader down
//! to a single workspace directory — `{root_dir}/.agentlane/skills/<id>/SKILL.md`
//! — since SPEC_FULL has no notion of a user-level skill override.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use agentlane_core::SkillRecord;

use crate::context::RunContext;

use super::{Tool, ToolResult};

/// YAML frontmatter metadata for a skill.
#[derive(Debug, Clone, Deserialize)]
struct SkillMeta {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "allowedTools")]
    allowed_tools: Vec<String>,
}

fn skills_dir(root_dir: &Path) -> PathBuf {
    root_dir.join(".agentlane/skills")
}

/// Parse a SKILL.md file: YAML frontmatter between `---` delimiters followed
/// by the markdown body.
fn parse_skill_md(content: &str) -> Option<(SkillMeta, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }
    let after_first = &trimmed[3..];
    let closing_idx = after_first.find("\n---")?;
    let yaml_block = &after_first[..closing_idx];
    let body_start = closing_idx + 4;
    let body = after_first
        .get(body_start..)
        .unwrap_or("")
        .trim_start_matches('\n')
        .to_string();

    let meta: SkillMeta = serde_yaml::from_str(yaml_block).ok()?;
    Some((meta, body))
}

fn load_skill(root_dir: &Path, id: &str) -> Result<SkillRecord, String> {
    let dir = skills_dir(root_dir).join(id);
    let skill_md_path = dir.join("SKILL.md");
    let raw = std::fs::read_to_string(&skill_md_path)
        .map_err(|e| format!("skill '{id}' not found: {e}"))?;
    let (meta, body) =
        parse_skill_md(&raw).ok_or_else(|| format!("skill '{id}': invalid SKILL.md frontmatter"))?;

    Ok(SkillRecord {
        id: id.to_string(),
        name: meta.name,
        skill_md_path: skill_md_path.display().to_string(),
        content: body,
        allowed_tools: meta.allowed_tools,
    })
}

/// `skill_load(idOrName)`.
pub struct SkillLoadTool;

#[async_trait]
impl Tool for SkillLoadTool {
    fn name(&self) -> &str {
        "skill_load"
    }

    fn description(&self) -> &str {
        "Load a skill document by id and pin it into this conversation's context."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "idOrName": { "type": "string" } },
            "required": ["idOrName"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let id = match input.get("idOrName").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s,
            _ => return ToolResult::error("missing required parameter: idOrName"),
        };

        let record = match load_skill(&ctx.root_dir, id) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(e),
        };

        ctx.add_loaded_skill(record.clone());

        let mut pinned = match ctx.store.load_meta() {
            Ok(meta) => meta.pinned_skill_ids,
            Err(_) => std::collections::BTreeSet::new(),
        };
        pinned.insert(record.id.clone());
        if let Err(e) = ctx.store.set_pinned_skill_ids(pinned).await {
            tracing::warn!(skill = %record.id, error = %e, "failed to pin loaded skill");
        }

        ToolResult::success(format!("loaded skill '{}': {}", record.id, record.name))
    }
}
