use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declaration order is the sort order: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub priority: TaskPriority,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>, priority: TaskPriority) -> Self {
        Self { name: name.into(), deadline, priority, completed: false }
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }
}
