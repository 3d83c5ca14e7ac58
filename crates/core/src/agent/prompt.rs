//! Instruction payload rendering
//!
//! The worker is an LLM-driven agent: everything it needs, including the
//! callback protocol, travels inside one text payload. Rendering is pure so
//! the exact payload for a given (profile, task, execution) is reproducible.
//! The JSON examples here must match what the webhook reconciler accepts;
//! tests on both sides pin the shape.

use std::fmt::Write;

use crate::agent::AgentProfile;
use crate::task::TaskSpec;

/// Render the full instruction text handed to the worker process.
///
/// `callback_base` is the dashboard's externally reachable origin, without a
/// trailing slash; the webhook path is appended here.
pub fn build_instructions(
    profile: &AgentProfile,
    task: &TaskSpec,
    execution_id: &str,
    callback_base: &str,
) -> String {
    let mut out = String::with_capacity(4096);

    let skills = profile
        .enabled_skills()
        .map(|s| format!("- **{}**: {}", s.name, s.description))
        .collect::<Vec<_>>()
        .join("\n");

    let workflow = profile
        .workflow
        .iter()
        .map(|w| {
            format!(
                "{}. **{}** - {}{}",
                w.step,
                w.name,
                w.description,
                if w.required { " *(required)*" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let subtasks = if task.subtasks.is_empty() {
        "No subtasks defined.".to_string()
    } else {
        task.subtasks
            .iter()
            .map(|st| {
                format!(
                    "- [{}] [{}] {}",
                    if st.completed { "x" } else { " " },
                    st.id,
                    st.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let description = if task.description.is_empty() {
        "No description provided."
    } else {
        &task.description
    };

    let _ = write!(
        out,
        "# {name} - Task Execution\n\n\
         ## Agent Profile\n\
         **Role:** {role}\n\
         **Agent ID:** {agent_id}\n\n\
         ## Active Skills\n{skills}\n\n\
         ## Workflow Steps\n{workflow}\n\n\
         ---\n\n\
         ## TASK EXECUTION REQUEST\n\
         **Task ID:** {task_id}\n\
         **Execution ID:** {execution_id}\n\
         **Title:** {title}\n\
         **Priority:** {priority}\n\n\
         ## Description\n{description}\n\n\
         ## Subtasks\n{subtasks}\n\n\
         ---\n\n\
         ## Progress Reporting\n\
         Report your progress via POST {callback_base}/openclaw/webhook\n\n\
         ### Available Webhook Actions\n\n",
        name = profile.name,
        role = profile.role,
        agent_id = profile.id,
        skills = skills,
        workflow = workflow,
        task_id = task.id,
        execution_id = execution_id,
        title = task.title,
        priority = task.priority.as_str(),
        description = description,
        subtasks = subtasks,
        callback_base = callback_base,
    );

    let actions: &[(&str, &str, &str)] = &[
        (
            "subtask_complete",
            "Mark a subtask as done",
            r#"{ "subtaskId": "st-xxx" }"#,
        ),
        (
            "progress_update",
            "Update overall progress (0-100)",
            r#"{ "progress": 50, "message": "Working on step 2..." }"#,
        ),
        (
            "log",
            "Add a log entry",
            r#"{ "message": "Found relevant files" }"#,
        ),
        (
            "request_review",
            "Request human review before completion",
            r#"{ "reviewNotes": "Please verify the changes to..." }"#,
        ),
        (
            "complete",
            "Mark the task as complete",
            r#"{ "summary": "Successfully completed all steps" }"#,
        ),
        (
            "error",
            "Report an unrecoverable error",
            r#"{ "error": "Error message describing what went wrong" }"#,
        ),
    ];

    for (i, (action, label, data)) in actions.iter().enumerate() {
        let _ = write!(
            out,
            "{n}. **{action}** - {label}\n\
             ```json\n\
             {{\n  \"taskId\": \"{task_id}\",\n  \"executionId\": \"{execution_id}\",\n  \"action\": \"{action}\",\n  \"data\": {data}\n}}\n\
             ```\n\n",
            n = i + 1,
            action = action,
            label = label,
            data = data,
            task_id = task.id,
            execution_id = execution_id,
        );
    }

    let first_step = profile.workflow.first().map(|w| w.name).unwrap_or("ANALYZE");

    let _ = write!(
        out,
        "---\n\n\
         ## Execution Instructions\n\n\
         Follow your workflow steps in order.\n\n\
         **Important Guidelines:**\n\
         - Report progress after each workflow step\n\
         - Mark subtasks as complete when finished\n\
         - If you encounter blockers, use the error webhook\n\
         - For ambiguous decisions, use request_review\n\n\
         Begin execution now, starting with step 1: **{first_step}**",
        first_step = first_step,
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profile_by_id;
    use crate::task::{Subtask, TaskPriority};

    fn sample_task() -> TaskSpec {
        TaskSpec {
            id: "task-42".to_string(),
            title: "Add retry logic".to_string(),
            description: "Wrap outbound calls in a retry".to_string(),
            priority: TaskPriority::High,
            subtasks: vec![
                Subtask {
                    id: "st-1".to_string(),
                    text: "Add backoff helper".to_string(),
                    completed: true,
                },
                Subtask {
                    id: "st-2".to_string(),
                    text: "Wire into client".to_string(),
                    completed: false,
                },
            ],
            tags: Vec::new(),
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let profile = profile_by_id("developer").unwrap();
        let task = sample_task();
        let a = build_instructions(profile, &task, "exec-1", "http://localhost:8080");
        let b = build_instructions(profile, &task, "exec-1", "http://localhost:8080");
        assert_eq!(a, b);
    }

    #[test]
    fn includes_identity_and_callback_url() {
        let profile = profile_by_id("qa").unwrap();
        let text = build_instructions(profile, &sample_task(), "exec-9", "http://host:1234");
        assert!(text.contains("**Agent ID:** qa"));
        assert!(text.contains("**Execution ID:** exec-9"));
        assert!(text.contains("POST http://host:1234/openclaw/webhook"));
    }

    #[test]
    fn renders_subtask_checkbox_state() {
        let profile = profile_by_id("developer").unwrap();
        let text = build_instructions(profile, &sample_task(), "exec-1", "http://localhost");
        assert!(text.contains("- [x] [st-1] Add backoff helper"));
        assert!(text.contains("- [ ] [st-2] Wire into client"));
    }

    #[test]
    fn example_payloads_carry_every_action() {
        let profile = profile_by_id("developer").unwrap();
        let text = build_instructions(profile, &sample_task(), "exec-1", "http://localhost");
        for action in [
            "subtask_complete",
            "progress_update",
            "log",
            "request_review",
            "complete",
            "error",
        ] {
            assert!(
                text.contains(&format!("\"action\": \"{}\"", action)),
                "missing example for {}",
                action
            );
        }
    }

    #[test]
    fn example_payloads_parse_as_json() {
        let profile = profile_by_id("developer").unwrap();
        let text = build_instructions(profile, &sample_task(), "exec-1", "http://localhost");
        let mut seen = 0;
        for block in text.split("```json\n").skip(1) {
            let json = block.split("```").next().unwrap();
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(value["taskId"], "task-42");
            assert_eq!(value["executionId"], "exec-1");
            assert!(value["action"].is_string());
            assert!(value["data"].is_object());
            seen += 1;
        }
        assert_eq!(seen, 6);
    }
}
