use chrono::NaiveDate;
use tempfile::tempdir;
use tenon_core::board::TaskBoard;
use tenon_core::datastore::DataStore;
use tenon_core::task::{self, Priority, TaskItem};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn assert_forest_eq(left: &[TaskItem], right: &[TaskItem]) {
    assert_eq!(left.len(), right.len(), "child counts differ");
    for (a, b) in left.iter().zip(right) {
        assert_eq!(a.uuid, b.uuid);
        assert_eq!((a.id1, a.id2), (b.id1, b.id2));
        assert_eq!(a.name, b.name);
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.assigned, b.assigned);
        assert_eq!(a.due, b.due);
        assert_eq!(a.bring_forward, b.bring_forward);
        assert_eq!(a.is_expanded, b.is_expanded);
        assert_forest_eq(&a.children, &b.children);
    }
}

#[test]
fn forest_roundtrip_reproduces_an_equal_tree() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let today = date(2026, 8, 6);

    let mut board = TaskBoard::new(vec![], None);
    board.new_project("Billing rework".to_string(), today);
    board.new_subtask("Schema".to_string(), today);
    board.new_subtask("Queries".to_string(), today);
    board.clear_selection();
    board.new_task("Standalone".to_string(), today);
    board.set_priority(Priority::High, today);
    board.collapse_all();

    store.save_forest(&board.items).expect("save forest");
    let reloaded = store.load_forest().expect("load forest");

    assert_forest_eq(&board.items, &reloaded);
    // Three levels deep and child order intact.
    assert_eq!(reloaded[0].children[0].children[0].name, "Queries");
}

#[test]
fn selection_persists_until_its_node_disappears() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let today = date(2026, 8, 6);

    let mut board = TaskBoard::new(vec![], None);
    let kept = board.new_task("kept".to_string(), today);
    store.save_forest(&board.items).expect("save forest");
    store.set_selection(board.selected()).expect("save selection");

    let board = TaskBoard::new(
        store.load_forest().expect("load"),
        store.get_selection().expect("selection"),
    );
    assert_eq!(board.selected(), Some(kept));

    // Wipe the forest behind the pointer; the next load drops it.
    store.save_forest(&[]).expect("save empty");
    let board = TaskBoard::new(
        store.load_forest().expect("load"),
        store.get_selection().expect("selection"),
    );
    assert!(board.selected().is_none());
}

#[test]
fn deep_delete_removes_from_the_true_parent() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let today = date(2026, 8, 6);

    let mut board = TaskBoard::new(vec![], None);
    board.new_task("root".to_string(), today);
    board.new_task("mid".to_string(), today);
    board.new_task("leaf".to_string(), today);
    store.save_forest(&board.items).expect("save forest");
    store.set_selection(board.selected()).expect("save selection");

    let mut board = TaskBoard::new(
        store.load_forest().expect("load"),
        store.get_selection().expect("selection"),
    );
    let leaf = task::find_by_ids(&board.items, 3, Some(1))
        .expect("leaf present")
        .uuid;
    assert_eq!(board.selected(), Some(leaf));

    board.delete_selected().expect("leaf removed");
    store.save_forest(&board.items).expect("save forest");
    store.set_selection(board.selected()).expect("save selection");

    let reloaded = store.load_forest().expect("load");
    assert!(task::find(&reloaded, leaf).is_none());
    assert_eq!(task::count_nodes(&reloaded), 2);
    assert!(reloaded[0].children[0].children.is_empty());
    assert!(store.get_selection().expect("selection").is_none());
}

#[test]
fn edit_mode_is_transient_across_the_store() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let today = date(2026, 8, 6);

    let mut board = TaskBoard::new(vec![], None);
    board.new_task("draft".to_string(), today);
    assert!(board.items[0].is_in_edit_mode);
    store.save_forest(&board.items).expect("save forest");

    let reloaded = store.load_forest().expect("load");
    assert!(!reloaded[0].is_in_edit_mode);
}
