use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow::anyhow!("unknown priority: {other}")),
        }
    }
}

/// The capability every node in the outline shares, whatever its concrete
/// type: a label, child nodes, and the two transient display flags.
pub trait DisplayItem {
    fn display_name(&self) -> String;
    fn children(&self) -> Vec<&dyn DisplayItem>;
    fn is_expanded(&self) -> bool;
    fn is_in_edit_mode(&self) -> bool;
}

/// A node in the task forest. Children are exclusively owned, so the tree
/// is acyclic by construction; there are no parent back-references, and
/// ancestor lookup is always a top-down search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub uuid: Uuid,
    pub id1: i64,
    pub id2: i64,
    pub name: String,
    pub priority: Priority,
    pub assigned: NaiveDate,

    #[serde(default)]
    pub due: Option<NaiveDate>,

    #[serde(default)]
    pub bring_forward: Option<NaiveDate>,

    #[serde(default)]
    pub is_expanded: bool,

    #[serde(skip)]
    pub is_in_edit_mode: bool,

    #[serde(default)]
    pub children: Vec<TaskItem>,
}

impl TaskItem {
    /// A freshly created task: sub-id fixed at 1, medium priority, due in a
    /// week, brought forward tomorrow, opened in edit mode.
    pub fn new(id1: i64, name: String, today: NaiveDate) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id1,
            id2: 1,
            name,
            priority: Priority::Medium,
            assigned: today,
            due: Some(today + chrono::Duration::days(7)),
            bring_forward: Some(today + chrono::Duration::days(1)),
            is_expanded: false,
            is_in_edit_mode: true,
            children: vec![],
        }
    }

    /// Raising priority to high on a task without a due date stamps it due
    /// today. An existing due date is never touched, and lower priorities
    /// never assign one.
    pub fn set_priority(&mut self, priority: Priority, today: NaiveDate) {
        if priority == Priority::High && self.due.is_none() {
            self.due = Some(today);
        }
        self.priority = priority;
    }

    #[must_use]
    pub fn is_high_priority_today(&self, today: NaiveDate) -> bool {
        self.priority == Priority::High && self.due == Some(today)
    }

    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}.{}", self.id1, self.id2)
    }
}

impl DisplayItem for TaskItem {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn children(&self) -> Vec<&dyn DisplayItem> {
        self.children
            .iter()
            .map(|child| child as &dyn DisplayItem)
            .collect()
    }

    fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    fn is_in_edit_mode(&self) -> bool {
        self.is_in_edit_mode
    }
}

/// A childless label/value leaf shown alongside tasks in the outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDataItem {
    pub label: String,
    pub value: String,
}

impl ProjectDataItem {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl DisplayItem for ProjectDataItem {
    fn display_name(&self) -> String {
        format!("{}: {}", self.label, self.value)
    }

    fn children(&self) -> Vec<&dyn DisplayItem> {
        vec![]
    }

    fn is_expanded(&self) -> bool {
        false
    }

    // Data rows are never editable.
    fn is_in_edit_mode(&self) -> bool {
        false
    }
}

/// Next free group identifier: one past the maximum `id1` anywhere in the
/// forest, nested children included. A full scan on every call; forests are
/// small and single-user.
#[must_use]
pub fn next_id1(forest: &[TaskItem]) -> i64 {
    fn max_id1(nodes: &[TaskItem]) -> i64 {
        nodes
            .iter()
            .map(|node| node.id1.max(max_id1(&node.children)))
            .max()
            .unwrap_or(0)
    }
    max_id1(forest) + 1
}

#[must_use]
pub fn find(forest: &[TaskItem], uuid: Uuid) -> Option<&TaskItem> {
    for node in forest {
        if node.uuid == uuid {
            return Some(node);
        }
        if let Some(found) = find(&node.children, uuid) {
            return Some(found);
        }
    }
    None
}

pub fn find_mut(forest: &mut [TaskItem], uuid: Uuid) -> Option<&mut TaskItem> {
    for node in forest {
        if node.uuid == uuid {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, uuid) {
            return Some(found);
        }
    }
    None
}

/// Depth-first search for the owning collection and in-place removal.
/// Returns the removed subtree, or None if no node carries the uuid.
pub fn remove(forest: &mut Vec<TaskItem>, uuid: Uuid) -> Option<TaskItem> {
    if let Some(idx) = forest.iter().position(|node| node.uuid == uuid) {
        return Some(forest.remove(idx));
    }
    for node in forest {
        if let Some(removed) = remove(&mut node.children, uuid) {
            return Some(removed);
        }
    }
    None
}

#[must_use]
pub fn count_nodes(forest: &[TaskItem]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_nodes(&node.children))
        .sum()
}

/// First node matching the id pair, in depth-first order. The pair is not
/// validated for uniqueness anywhere, so "first" is all callers get.
#[must_use]
pub fn find_by_ids(forest: &[TaskItem], id1: i64, id2: Option<i64>) -> Option<&TaskItem> {
    for node in forest {
        if node.id1 == id1 && id2.is_none_or(|id2| node.id2 == id2) {
            return Some(node);
        }
        if let Some(found) = find_by_ids(&node.children, id1, id2) {
            return Some(found);
        }
    }
    None
}
