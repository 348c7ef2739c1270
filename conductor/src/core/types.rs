//! Shared deterministic types for the decision core.
//!
//! Item records come from the item store as-is; [`Item`] is the classified,
//! read-only view the rest of the core works with. Raw label strings are only
//! inspected while building a snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Open pull request as listed by the item store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub labels: Vec<String>,
}

/// Open issue as listed by the item store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    PullRequest,
    Task,
    Epic,
}

/// Work status derived once from the item's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Open,
    /// Another agent already holds the item (persisted marker label).
    Processing,
}

/// Classified tracked item. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub kind: ItemKind,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub status: ItemStatus,
    /// Owning agent label (e.g. `agent:webapp`), if any.
    pub agent_owner: Option<String>,
}

impl Item {
    pub fn is_processing(&self) -> bool {
        self.status == ItemStatus::Processing
    }

    pub fn is_epic(&self) -> bool {
        self.kind == ItemKind::Epic
    }

    pub fn matches(&self, repo: &str, number: u64) -> bool {
        self.repo == repo && self.number == number
    }
}

/// Kind of follow-up work bound to one item.
///
/// The serialized names are the wire names the decision oracle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "review_pr")]
    Review,
    #[serde(rename = "implement_task")]
    Implement,
    #[serde(rename = "decompose_epic")]
    Decompose,
    #[serde(rename = "monitor_task")]
    Monitor,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Review => "review_pr",
            ActionKind::Implement => "implement_task",
            ActionKind::Decompose => "decompose_epic",
            ActionKind::Monitor => "monitor_task",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.trim() {
            "review_pr" => Some(ActionKind::Review),
            "implement_task" => Some(ActionKind::Implement),
            "decompose_epic" => Some(ActionKind::Decompose),
            "monitor_task" => Some(ActionKind::Monitor),
            _ => None,
        }
    }

    /// Priority tier. Lower runs first; monitor sits outside the baseline tiers.
    pub fn priority(self) -> u8 {
        match self {
            ActionKind::Review => 1,
            ActionKind::Implement => 2,
            ActionKind::Decompose => 3,
            ActionKind::Monitor => 4,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used for per-cycle deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionKey {
    pub kind: ActionKind,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}#{}", self.kind, self.repo, self.number)
    }
}

/// A unit of dispatch work. Each variant carries only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "review_pr")]
    Review {
        repo: String,
        number: u64,
        title: String,
    },
    #[serde(rename = "implement_task")]
    Implement {
        repo: String,
        number: u64,
        title: String,
        body: String,
    },
    #[serde(rename = "decompose_epic")]
    Decompose {
        repo: String,
        number: u64,
        title: String,
        body: String,
    },
    #[serde(rename = "monitor_task")]
    Monitor {
        repo: String,
        number: u64,
        title: String,
    },
}

impl Action {
    pub fn review(pr: &Item) -> Self {
        Action::Review {
            repo: pr.repo.clone(),
            number: pr.number,
            title: pr.title.clone(),
        }
    }

    pub fn implement(task: &Item) -> Self {
        Action::Implement {
            repo: task.repo.clone(),
            number: task.number,
            title: task.title.clone(),
            body: task.body.clone(),
        }
    }

    pub fn decompose(epic: &Item) -> Self {
        Action::Decompose {
            repo: epic.repo.clone(),
            number: epic.number,
            title: epic.title.clone(),
            body: epic.body.clone(),
        }
    }

    pub fn monitor(task: &Item) -> Self {
        Action::Monitor {
            repo: task.repo.clone(),
            number: task.number,
            title: task.title.clone(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Review { .. } => ActionKind::Review,
            Action::Implement { .. } => ActionKind::Implement,
            Action::Decompose { .. } => ActionKind::Decompose,
            Action::Monitor { .. } => ActionKind::Monitor,
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            Action::Review { repo, .. }
            | Action::Implement { repo, .. }
            | Action::Decompose { repo, .. }
            | Action::Monitor { repo, .. } => repo,
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Action::Review { number, .. }
            | Action::Implement { number, .. }
            | Action::Decompose { number, .. }
            | Action::Monitor { number, .. } => *number,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Action::Review { title, .. }
            | Action::Implement { title, .. }
            | Action::Decompose { title, .. }
            | Action::Monitor { title, .. } => title,
        }
    }

    /// Body text, only carried by implement and decompose actions.
    pub fn body(&self) -> Option<&str> {
        match self {
            Action::Implement { body, .. } | Action::Decompose { body, .. } => Some(body),
            Action::Review { .. } | Action::Monitor { .. } => None,
        }
    }

    pub fn priority(&self) -> u8 {
        self.kind().priority()
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            kind: self.kind(),
            repo: self.repo().to_string(),
            number: self.number(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
