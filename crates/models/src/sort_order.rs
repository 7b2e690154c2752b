use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// How the task list is ordered. Persisted by its upper-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    #[default]
    None,
    ByDeadline,
    ByPriority,
    ByDeadlineAndPriority,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::None => "NONE",
            SortOrder::ByDeadline => "BY_DEADLINE",
            SortOrder::ByPriority => "BY_PRIORITY",
            SortOrder::ByDeadlineAndPriority => "BY_DEADLINE_AND_PRIORITY",
        }
    }

    pub fn sorts_by_deadline(self) -> bool {
        matches!(self, SortOrder::ByDeadline | SortOrder::ByDeadlineAndPriority)
    }

    pub fn sorts_by_priority(self) -> bool {
        matches!(self, SortOrder::ByPriority | SortOrder::ByDeadlineAndPriority)
    }

    fn from_flags(deadline: bool, priority: bool) -> Self {
        match (deadline, priority) {
            (false, false) => SortOrder::None,
            (true, false) => SortOrder::ByDeadline,
            (false, true) => SortOrder::ByPriority,
            (true, true) => SortOrder::ByDeadlineAndPriority,
        }
    }

    /// Turn deadline sorting on or off, keeping the priority dimension as is.
    pub fn with_deadline(self, enable: bool) -> Self {
        Self::from_flags(enable, self.sorts_by_priority())
    }

    /// Turn priority sorting on or off, keeping the deadline dimension as is.
    pub fn with_priority(self, enable: bool) -> Self {
        Self::from_flags(self.sorts_by_deadline(), enable)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SortOrder::None),
            "BY_DEADLINE" => Ok(SortOrder::ByDeadline),
            "BY_PRIORITY" => Ok(SortOrder::ByPriority),
            "BY_DEADLINE_AND_PRIORITY" => Ok(SortOrder::ByDeadlineAndPriority),
            other => Err(ModelError::Validation(format!("unknown sort order `{other}`"))),
        }
    }
}
