//! Task model
//!
//! A `TaskSpec` is the execution core's view of a board task: everything the
//! instruction builder needs, nothing the board keeps to itself. The board
//! sends it inline with the start request; the core never reads board
//! storage.

use serde::{Deserialize, Serialize};

/// Task priority, also used to order the waiting queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    /// Queue ordering rank, lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A checklist item inside a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// The task payload handed to the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskSpec {
    /// Minimal spec for a bare task id, used when the board starts a task
    /// without sending its details along.
    pub fn untitled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: "Untitled Task".to_string(),
            description: String::new(),
            priority: TaskPriority::default(),
            subtasks: Vec::new(),
            tags: Vec::new(),
        }
    }
}
