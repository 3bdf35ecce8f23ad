use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::task::{self, Priority, TaskItem};

/// The in-memory forest plus the single-selection pointer every tree
/// operation acts through. The board owns the root collection; each task
/// owns its children.
#[derive(Debug, Clone)]
pub struct TaskBoard {
    pub items: Vec<TaskItem>,
    selected: Option<Uuid>,
}

impl TaskBoard {
    /// A selection pointing at a node that no longer exists is dropped on
    /// construction rather than left dangling.
    pub fn new(items: Vec<TaskItem>, selected: Option<Uuid>) -> Self {
        let selected = selected.filter(|uuid| {
            let known = task::find(&items, *uuid).is_some();
            if !known {
                warn!(%uuid, "dropping stale selection");
            }
            known
        });
        Self { items, selected }
    }

    #[must_use]
    pub fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    #[must_use]
    pub fn selected_item(&self) -> Option<&TaskItem> {
        self.selected
            .and_then(|uuid| task::find(&self.items, uuid))
    }

    pub fn select(&mut self, uuid: Uuid) -> bool {
        if task::find(&self.items, uuid).is_none() {
            warn!(%uuid, "refusing to select unknown node");
            return false;
        }
        self.selected = Some(uuid);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Create a task under the current selection (force-expanding the
    /// parent), or as a new root when nothing is selected. The new task
    /// always becomes the selection. Never fails.
    pub fn new_task(&mut self, name: String, today: NaiveDate) -> Uuid {
        let item = TaskItem::new(task::next_id1(&self.items), name, today);
        let uuid = item.uuid;

        match self.selected.and_then(|sel| task::find_mut(&mut self.items, sel)) {
            Some(parent) => {
                parent.is_expanded = true;
                parent.children.push(item);
            }
            None => self.items.push(item),
        }

        self.selected = Some(uuid);
        debug!(%uuid, "created task");
        uuid
    }

    /// Projects always land in the root list regardless of selection and
    /// get a month of runway instead of a week.
    pub fn new_project(&mut self, name: String, today: NaiveDate) -> Uuid {
        let mut item = TaskItem::new(task::next_id1(&self.items), name, today);
        item.due = Some(today + Duration::days(30));
        let uuid = item.uuid;

        self.items.push(item);
        self.selected = Some(uuid);
        debug!(%uuid, "created project");
        uuid
    }

    /// Requires a selection; without one this is a no-op returning None.
    pub fn new_subtask(&mut self, name: String, today: NaiveDate) -> Option<Uuid> {
        let sel = self.selected?;
        let item = TaskItem::new(task::next_id1(&self.items), name, today);
        let uuid = item.uuid;

        let parent = task::find_mut(&mut self.items, sel)?;
        parent.is_expanded = true;
        parent.children.push(item);

        self.selected = Some(uuid);
        debug!(%uuid, parent = %sel, "created subtask");
        Some(uuid)
    }

    /// Flips the edit flag on the selection. Returns the new state, or None
    /// without a selection.
    pub fn toggle_edit(&mut self) -> Option<bool> {
        let sel = self.selected?;
        let item = task::find_mut(&mut self.items, sel)?;
        item.is_in_edit_mode = !item.is_in_edit_mode;
        Some(item.is_in_edit_mode)
    }

    pub fn rename(&mut self, name: &str) -> bool {
        let Some(item) = self
            .selected
            .and_then(|sel| task::find_mut(&mut self.items, sel))
        else {
            return false;
        };
        item.name = name.to_string();
        true
    }

    pub fn set_priority(&mut self, priority: Priority, today: NaiveDate) -> bool {
        let Some(item) = self
            .selected
            .and_then(|sel| task::find_mut(&mut self.items, sel))
        else {
            return false;
        };
        item.set_priority(priority, today);
        true
    }

    /// Depth-first search for the selected node's true owner and in-place
    /// removal; the selection is cleared on success. A missing target
    /// leaves everything untouched apart from a warning.
    pub fn delete_selected(&mut self) -> Option<TaskItem> {
        let sel = self.selected?;
        match task::remove(&mut self.items, sel) {
            Some(removed) => {
                self.selected = None;
                debug!(%sel, "deleted node");
                Some(removed)
            }
            None => {
                warn!(%sel, "delete target not found; nothing removed");
                None
            }
        }
    }

    pub fn expand(&mut self) -> bool {
        self.set_expanded_on_selection(true)
    }

    pub fn collapse(&mut self) -> bool {
        self.set_expanded_on_selection(false)
    }

    fn set_expanded_on_selection(&mut self, expanded: bool) -> bool {
        let Some(item) = self
            .selected
            .and_then(|sel| task::find_mut(&mut self.items, sel))
        else {
            return false;
        };
        item.is_expanded = expanded;
        true
    }

    /// Recursively sets the flag on every node that has children, returning
    /// how many nodes actually changed. Leaves are never counted.
    pub fn expand_all(&mut self) -> usize {
        set_expanded_recursive(&mut self.items, true)
    }

    pub fn collapse_all(&mut self) -> usize {
        set_expanded_recursive(&mut self.items, false)
    }
}

fn set_expanded_recursive(nodes: &mut [TaskItem], expanded: bool) -> usize {
    let mut changed = 0;
    for node in nodes {
        if !node.children.is_empty() && node.is_expanded != expanded {
            node.is_expanded = expanded;
            changed += 1;
        }
        changed += set_expanded_recursive(&mut node.children, expanded);
    }
    changed
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::TaskBoard;
    use crate::task::{self, TaskItem};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).expect("valid date")
    }

    #[test]
    fn new_task_without_selection_becomes_root() {
        let mut board = TaskBoard::new(vec![], None);
        let uuid = board.new_task("first".to_string(), today());

        assert_eq!(board.items.len(), 1);
        assert_eq!(board.selected(), Some(uuid));
        let item = &board.items[0];
        assert_eq!((item.id1, item.id2), (1, 1));
        assert_eq!(item.due, Some(today() + Duration::days(7)));
        assert_eq!(item.bring_forward, Some(today() + Duration::days(1)));
        assert!(item.is_in_edit_mode);
    }

    #[test]
    fn new_task_under_selection_expands_the_parent() {
        let mut board = TaskBoard::new(vec![], None);
        let parent = board.new_task("parent".to_string(), today());
        let child = board.new_task("child".to_string(), today());

        assert_eq!(board.items.len(), 1);
        assert_eq!(board.items[0].children.len(), 1);
        assert!(board.items[0].is_expanded);
        assert_eq!(board.items[0].children[0].uuid, child);
        assert_ne!(parent, child);
        assert_eq!(board.selected(), Some(child));
    }

    #[test]
    fn new_project_ignores_selection_and_gets_thirty_days() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("task".to_string(), today());
        let project = board.new_project("project".to_string(), today());

        assert_eq!(board.items.len(), 2);
        assert!(board.items[0].children.is_empty());
        assert_eq!(board.items[1].uuid, project);
        assert_eq!(board.items[1].due, Some(today() + Duration::days(30)));
    }

    #[test]
    fn subtask_requires_a_selection() {
        let mut board = TaskBoard::new(vec![], None);
        assert!(board.new_subtask("orphan".to_string(), today()).is_none());
        assert!(board.items.is_empty());

        board.new_task("parent".to_string(), today());
        let sub = board.new_subtask("sub".to_string(), today());
        assert!(sub.is_some());
        assert_eq!(board.items[0].children.len(), 1);
    }

    #[test]
    fn ids_keep_climbing_across_the_whole_forest() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("a".to_string(), today());
        board.new_task("b".to_string(), today()); // child of a, id1 = 2
        board.clear_selection();
        board.new_task("c".to_string(), today());

        assert_eq!(board.items[1].id1, 3);
        assert_eq!(task::next_id1(&board.items), 4);
    }

    #[test]
    fn delete_three_levels_deep_clears_selection() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("root".to_string(), today());
        board.new_task("mid".to_string(), today());
        let leaf = board.new_task("leaf".to_string(), today());

        assert!(board.select(leaf));
        let removed = board.delete_selected().expect("leaf removed");
        assert_eq!(removed.name, "leaf");
        assert!(board.selected().is_none());
        assert!(board.items[0].children[0].children.is_empty());
    }

    #[test]
    fn delete_without_selection_is_a_no_op() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("only".to_string(), today());
        board.clear_selection();
        assert!(board.delete_selected().is_none());
        assert_eq!(board.items.len(), 1);
    }

    #[test]
    fn stale_selection_is_dropped_on_construction() {
        let forest = vec![TaskItem::new(1, "a".to_string(), today())];
        let board = TaskBoard::new(forest, Some(uuid::Uuid::new_v4()));
        assert!(board.selected().is_none());
    }

    #[test]
    fn bulk_expand_counts_only_real_changes() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("root".to_string(), today());
        board.new_task("mid".to_string(), today());
        board.new_task("leaf".to_string(), today());
        board.clear_selection();
        board.new_task("lone".to_string(), today());

        // Creation force-expanded root and mid already.
        assert_eq!(board.expand_all(), 0);
        assert_eq!(board.collapse_all(), 2);
        assert_eq!(board.collapse_all(), 0);
        assert_eq!(board.expand_all(), 2);
    }

    #[test]
    fn toggle_edit_flips_and_reports() {
        let mut board = TaskBoard::new(vec![], None);
        board.new_task("t".to_string(), today());
        // Fresh tasks start in edit mode.
        assert_eq!(board.toggle_edit(), Some(false));
        assert_eq!(board.toggle_edit(), Some(true));
        board.clear_selection();
        assert_eq!(board.toggle_edit(), None);
    }
}
