//! Agent profiles and instruction rendering
//!
//! An agent profile describes one of the specialized worker personas the
//! dashboard can dispatch a task to. Profiles are static data; selection is
//! by explicit id, legacy alias, or keyword inference from the task.

mod profile;
mod prompt;
mod registry;

pub use profile::{AgentProfile, AgentSkill, SkillCategory, WorkflowStep};
pub use prompt::build_instructions;
pub use registry::{all_profiles, profile_by_id, profile_for_task, resolve_profile, select_profile};
