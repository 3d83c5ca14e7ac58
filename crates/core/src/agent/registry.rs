//! Agent selection
//!
//! Three ways to land on a profile, tried in this order by `select_profile`:
//! an explicit id (including legacy display names), keyword inference from
//! the task, and finally the developer profile as the catch-all.

use crate::task::TaskSpec;

use super::profile::{AgentProfile, CONTENT, DEVELOPER, DEVOPS, QA, RESEARCHER};

/// Task-type keyword to profile mapping, checked in order.
const TASK_MAPPINGS: &[(&str, &str)] = &[
    ("feature", "developer"),
    ("implementation", "developer"),
    ("bugfix", "developer"),
    ("bug", "developer"),
    ("research", "researcher"),
    ("investigation", "researcher"),
    ("documentation", "content"),
    ("docs", "content"),
    ("readme", "content"),
    ("deployment", "devops"),
    ("deploy", "devops"),
    ("ci", "devops"),
    ("cd", "devops"),
    ("docker", "devops"),
    ("infrastructure", "devops"),
    ("test", "qa"),
    ("testing", "qa"),
    ("validation", "qa"),
    ("audit", "qa"),
    ("review", "qa"),
];

/// Display names and historical aliases that still resolve.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("openclaw ai", "developer"),
    ("openclaw", "developer"),
    ("michel", "developer"),
    ("code architect", "developer"),
    ("developer agent", "developer"),
    ("knowledge navigator", "researcher"),
    ("researcher agent", "researcher"),
    ("documentation writer", "content"),
    ("content agent", "content"),
    ("infrastructure engineer", "devops"),
    ("devops agent", "devops"),
    ("quality assurance", "qa"),
    ("qa agent", "qa"),
];

static PROFILES: [&AgentProfile; 5] = [&DEVELOPER, &RESEARCHER, &CONTENT, &DEVOPS, &QA];

/// All registered profiles.
pub fn all_profiles() -> &'static [&'static AgentProfile] {
    &PROFILES
}

/// Look up a profile by its canonical id.
pub fn profile_by_id(id: &str) -> Option<&'static AgentProfile> {
    all_profiles().iter().copied().find(|p| p.id == id)
}

/// Resolve any id, display name, or legacy alias (case-insensitive).
pub fn resolve_profile(s: &str) -> Option<&'static AgentProfile> {
    let normalized = s.trim().to_lowercase();

    if let Some(profile) = profile_by_id(&normalized) {
        return Some(profile);
    }

    if let Some((_, id)) = LEGACY_ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        return profile_by_id(id);
    }

    // Partial match, tolerant of decorated names like "QA Agent (auto)"
    for (alias, id) in LEGACY_ALIASES {
        if normalized.contains(alias) || alias.contains(normalized.as_str()) {
            return profile_by_id(id);
        }
    }

    None
}

/// Infer the best profile for a task from its tags, title, and description.
pub fn profile_for_task(task: &TaskSpec) -> &'static AgentProfile {
    let mut terms: Vec<String> = Vec::new();
    terms.extend(task.tags.iter().map(|t| t.to_lowercase()));
    terms.extend(task.title.to_lowercase().split_whitespace().map(String::from));
    terms.extend(
        task.description
            .to_lowercase()
            .split_whitespace()
            .take(10)
            .map(String::from),
    );

    for (task_type, id) in TASK_MAPPINGS {
        if terms
            .iter()
            .any(|term| term.contains(task_type) || task_type.contains(term.as_str()))
        {
            if let Some(profile) = profile_by_id(id) {
                return profile;
            }
        }
    }

    &DEVELOPER
}

/// Selection used by the dispatcher: explicit request wins, then inference.
pub fn select_profile(explicit: Option<&str>, task: &TaskSpec) -> &'static AgentProfile {
    explicit
        .and_then(resolve_profile)
        .unwrap_or_else(|| profile_for_task(task))
}
