use chrono::NaiveDate;
use tempfile::tempdir;
use tenon_core::datastore::DataStore;
use tenon_core::export::{self, ExportFormat};
use tenon_core::profile::ExportProfile;
use tenon_core::timesheet::{TimeEntry, TimeSheet};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn entries_roundtrip_through_the_store() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let entries = vec![
        TimeEntry::new(100, Some(5), date(2026, 8, 3), 2.0, "migration".to_string()),
        TimeEntry::new(200, None, date(2026, 8, 4), 0.3, "standup".to_string()),
    ];
    store.save_entries(&entries).expect("save entries");

    let reloaded = store.load_entries().expect("load entries");
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded[0].project_reference(), "Project-100.5");
    assert_eq!(reloaded[1].project_reference(), "Generic-200");
    assert_eq!(reloaded[1].id2, None);
    assert_eq!(reloaded[1].date(), date(2026, 8, 4));
    // Rounding applied at construction survives the file.
    assert_eq!(reloaded[1].hours(), 0.25);
    assert_eq!(reloaded[1].description, "standup");
}

#[test]
fn weekly_export_scenario_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    // Monday 2h and Wednesday 3h on project 100.5; a generic Monday hour
    // on 200 that must never appear in the block.
    let entries = vec![
        TimeEntry::new(100, Some(5), date(2026, 8, 3), 2.0, String::new()),
        TimeEntry::new(100, Some(5), date(2026, 8, 5), 3.0, String::new()),
        TimeEntry::new(200, None, date(2026, 8, 3), 1.0, String::new()),
    ];
    store.save_entries(&entries).expect("save entries");

    let sheet = TimeSheet::new(store.load_entries().expect("load"), date(2026, 8, 6));
    assert_eq!(sheet.week_start(), date(2026, 8, 3));
    assert_eq!(sheet.current_week_entries().len(), 3);
    assert_eq!(sheet.week_total(), 6.0);
    assert_eq!(sheet.day_total(date(2026, 8, 3)), 3.0);

    let block =
        export::weekly_timesheet_block(&sheet.entries, sheet.week_start()).expect("one line");
    assert_eq!(block, "100\tV0000000005S\t\t\t\t2\t0\t3\t0\t0");
}

#[test]
fn ledger_cursor_roundtrips_and_ignores_junk() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    assert_eq!(store.get_cursor().expect("empty cursor"), None);
    store.set_cursor(date(2026, 8, 5)).expect("set cursor");
    assert_eq!(store.get_cursor().expect("cursor"), Some(date(2026, 8, 5)));

    std::fs::write(&store.cursor_path, "not-a-date").expect("scribble");
    assert_eq!(store.get_cursor().expect("lenient cursor"), None);
}

#[test]
fn profiles_persist_usage_across_store_opens() {
    let temp = tempdir().expect("tempdir");
    let today = date(2026, 8, 6);

    {
        let store = DataStore::open(temp.path()).expect("open datastore");
        let mut profiles = store.load_profiles().expect("load profiles");
        profiles.upsert(ExportProfile {
            name: "payroll".to_string(),
            fields: vec!["customer".to_string()],
            format: ExportFormat::Tsv,
            usage_count: 0,
            last_used: None,
        });
        profiles.record_use("payroll", today).expect("record");
        store.save_profiles(&profiles).expect("save profiles");
    }

    let store = DataStore::open(temp.path()).expect("reopen datastore");
    let profiles = store.load_profiles().expect("load profiles");
    let payroll = profiles.get("payroll").expect("payroll profile");
    assert_eq!(payroll.usage_count, 1);
    assert_eq!(payroll.last_used, Some(today));
    assert_eq!(payroll.format, ExportFormat::Tsv);
}
