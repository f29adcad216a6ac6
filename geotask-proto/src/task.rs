//! Task document types for `GeoTask`.
//!
//! Defines the task entity stored under each user's namespace, the closed
//! set of well-known categories with their priority tiers, the category
//! filter and sort selections applied to the published view, and the
//! partial update sent when a task is edited.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Category of a task.
///
/// The well-known categories drive priority ordering. Documents written by
/// other clients may carry any string; those are kept verbatim as
/// [`Category::Custom`] and rank in the lowest tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Work,
    Medicine,
    Grocery,
    Food,
    Shopping,
    Touring,
    Entertainment,
    Others,
    /// A category name outside the well-known set.
    Custom(String),
}

impl Category {
    /// The well-known categories, in the order offered to users.
    pub const KNOWN: [Self; 8] = [
        Self::Work,
        Self::Medicine,
        Self::Grocery,
        Self::Food,
        Self::Shopping,
        Self::Touring,
        Self::Entertainment,
        Self::Others,
    ];

    /// Returns the display and storage name of the category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Work => "Work",
            Self::Medicine => "Medicine",
            Self::Grocery => "Grocery",
            Self::Food => "Food",
            Self::Shopping => "Shopping",
            Self::Touring => "Touring",
            Self::Entertainment => "Entertainment",
            Self::Others => "Others",
            Self::Custom(name) => name,
        }
    }

    /// Priority tier used by [`SortOption::ByPriority`]; lower sorts first.
    ///
    /// - Tier 1: Work, Medicine, Grocery, Food
    /// - Tier 2: Shopping, Touring
    /// - Tier 3: everything else
    #[must_use]
    pub fn priority_tier(&self) -> u8 {
        match self.as_str() {
            "Work" | "Medicine" | "Grocery" | "Food" => 1,
            "Shopping" | "Touring" => 2,
            _ => 3,
        }
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Work" => Self::Work,
            "Medicine" => Self::Medicine,
            "Grocery" => Self::Grocery,
            "Food" => Self::Food,
            "Shopping" => Self::Shopping,
            "Touring" => Self::Touring,
            "Entertainment" => Self::Entertainment,
            // Older clients wrote the singular form.
            "Others" | "Other" => Self::Others,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category selection applied to the published view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    /// No filtering; every task passes.
    #[default]
    All,
    /// Keep only tasks whose category name equals this one exactly.
    Only(Category),
}

impl CategoryFilter {
    /// Sentinel name of the unfiltered selection.
    pub const ALL: &'static str = "All";

    /// Returns true if a task with `category` passes this filter.
    ///
    /// Matching is a case-sensitive comparison of category names.
    #[must_use]
    pub fn matches(&self, category: &Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted.as_str() == category.as_str(),
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(name: &str) -> Self {
        if name == Self::ALL {
            Self::All
        } else {
            Self::Only(Category::from(name))
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(Self::ALL),
            Self::Only(category) => write!(f, "{category}"),
        }
    }
}

/// Ordering applied to the filtered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOption {
    /// Category priority tier, then deadline.
    #[default]
    ByPriority,
    /// Deadline, earliest first.
    ByDeadline,
    /// Creation time, oldest first.
    ByCreatedAt,
    /// Category name, lexicographic.
    ByCategory,
}

impl SortOption {
    /// All sort options, in menu order.
    pub const ALL: [Self; 4] = [
        Self::ByPriority,
        Self::ByDeadline,
        Self::ByCreatedAt,
        Self::ByCategory,
    ];
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByPriority => write!(f, "by-priority"),
            Self::ByDeadline => write!(f, "by-deadline"),
            Self::ByCreatedAt => write!(f, "by-created-at"),
            Self::ByCategory => write!(f, "by-category"),
        }
    }
}

/// Error returned when a sort option name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort option: {0}")]
pub struct ParseSortOptionError(pub String);

impl FromStr for SortOption {
    type Err = ParseSortOptionError;

    /// Accepts `by-priority`, `BY_PRIORITY`, `priority` and the same
    /// spellings for the other options, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let key = normalized.strip_prefix("by-").unwrap_or(&normalized);
        match key {
            "priority" => Ok(Self::ByPriority),
            "deadline" => Ok(Self::ByDeadline),
            "created-at" | "created" => Ok(Self::ByCreatedAt),
            "category" => Ok(Self::ByCategory),
            _ => Err(ParseSortOptionError(s.to_string())),
        }
    }
}

/// A to-do item owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier (UUID v7), immutable.
    pub id: TaskId,
    /// Display title; never empty once persisted.
    pub title: String,
    /// Task category.
    pub category: Category,
    /// When this task was created (milliseconds since epoch), immutable.
    pub created_at: u64,
    /// Target completion time (milliseconds since epoch).
    pub deadline: u64,
}

impl Task {
    /// Creates a task with a freshly generated id.
    #[must_use]
    pub fn new(title: String, category: Category, deadline: u64, created_at: u64) -> Self {
        Self {
            id: TaskId::new(),
            title,
            category,
            created_at,
            deadline,
        }
    }

    /// Overwrites the mutable fields with the values carried by `patch`.
    pub fn apply(&mut self, patch: &TaskPatch) {
        self.title.clone_from(&patch.title);
        self.category = patch.category.clone();
        self.deadline = patch.deadline;
    }
}

/// The mutable fields of a task, sent as a partial document update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    pub title: String,
    /// New category.
    pub category: Category,
    /// New deadline (milliseconds since epoch).
    pub deadline: u64,
}
