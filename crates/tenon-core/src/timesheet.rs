use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::datetime;

/// One dated booking of hours against a timecode. `id2 == None` is a
/// generic timecode; `Some` ties the entry to a project sub-item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id1: i64,

    #[serde(default)]
    pub id2: Option<i64>,

    date: NaiveDate,
    hours: f64,

    #[serde(default)]
    pub description: String,
}

impl TimeEntry {
    /// A weekend construction date falls back to the preceding Friday so
    /// the entry lands in the week the work was done; hours go through the
    /// usual rounding and clamping.
    pub fn new(
        id1: i64,
        id2: Option<i64>,
        date: NaiveDate,
        hours: f64,
        description: String,
    ) -> Self {
        Self {
            id1,
            id2,
            date: datetime::clamp_back_to_weekday(date),
            hours: round_hours(hours),
            description,
        }
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Weekend dates are silently rejected: the old value is kept and the
    /// rejection is only visible in the log.
    pub fn set_date(&mut self, date: NaiveDate) {
        if !datetime::is_weekday(date) {
            warn!(%date, "rejecting weekend date; keeping {}", self.date);
            return;
        }
        self.date = date;
    }

    #[must_use]
    pub fn hours(&self) -> f64 {
        self.hours
    }

    /// Rounds to the nearest quarter hour (ties away from zero) and clamps
    /// to a single day's 0..=24 range.
    pub fn set_hours(&mut self, hours: f64) {
        self.hours = round_hours(hours);
    }

    #[must_use]
    pub fn week_start(&self) -> NaiveDate {
        datetime::week_start(self.date)
    }

    #[must_use]
    pub fn project_reference(&self) -> String {
        match self.id2 {
            Some(id2) => format!("Project-{}.{}", self.id1, id2),
            None => format!("Generic-{}", self.id1),
        }
    }
}

fn round_hours(hours: f64) -> f64 {
    let quarters = (hours * 4.0).round();
    (quarters / 4.0).clamp(0.0, 24.0)
}

/// The flat entry list plus the weekday cursor the week views hang off.
/// There are no cross-entry invariants; capping a day's total is the
/// caller's business.
#[derive(Debug, Clone)]
pub struct TimeSheet {
    pub entries: Vec<TimeEntry>,
    selected_date: NaiveDate,
}

impl TimeSheet {
    /// A weekend starting date is clamped forward to Monday; the cursor is
    /// a weekday from then on.
    pub fn new(entries: Vec<TimeEntry>, start: NaiveDate) -> Self {
        Self {
            entries,
            selected_date: datetime::clamp_forward_to_weekday(start),
        }
    }

    #[must_use]
    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    /// Weekend values are rejected as a logged no-op, mirroring the entry
    /// date guard.
    pub fn set_selected_date(&mut self, date: NaiveDate) -> bool {
        if !datetime::is_weekday(date) {
            warn!(%date, "rejecting weekend cursor; keeping {}", self.selected_date);
            return false;
        }
        debug!(%date, "moved cursor");
        self.selected_date = date;
        true
    }

    pub fn next_day(&mut self) {
        self.selected_date = datetime::next_weekday(self.selected_date);
    }

    pub fn previous_day(&mut self) {
        self.selected_date = datetime::previous_weekday(self.selected_date);
    }

    pub fn next_week(&mut self) {
        self.selected_date += Duration::days(7);
    }

    pub fn previous_week(&mut self) {
        self.selected_date -= Duration::days(7);
    }

    pub fn today(&mut self, today: NaiveDate) {
        self.selected_date = datetime::clamp_forward_to_weekday(today);
    }

    /// Monday of the selected week.
    pub fn current_week(&mut self) {
        self.selected_date = self.week_start();
    }

    #[must_use]
    pub fn week_start(&self) -> NaiveDate {
        datetime::week_start(self.selected_date)
    }

    #[must_use]
    pub fn week_dates(&self) -> [NaiveDate; 5] {
        datetime::week_dates(self.week_start())
    }

    /// The selected week's entries sorted by date, then group, then
    /// sub-identifier.
    #[must_use]
    pub fn current_week_entries(&self) -> Vec<&TimeEntry> {
        let start = self.week_start();
        let mut rows: Vec<&TimeEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.week_start() == start)
            .collect();
        rows.sort_by_key(|entry| (entry.date(), entry.id1, entry.id2));
        rows
    }

    #[must_use]
    pub fn day_total(&self, date: NaiveDate) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.date() == date)
            .map(TimeEntry::hours)
            .sum()
    }

    #[must_use]
    pub fn week_total(&self) -> f64 {
        self.current_week_entries()
            .iter()
            .map(|entry| entry.hours())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{TimeEntry, TimeSheet};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn weekend_dates_are_rejected_in_place() {
        let mut entry = TimeEntry::new(100, Some(5), date(2026, 8, 3), 2.0, String::new());
        entry.set_date(date(2026, 8, 8)); // Saturday
        assert_eq!(entry.date(), date(2026, 8, 3));
        entry.set_date(date(2026, 8, 9)); // Sunday
        assert_eq!(entry.date(), date(2026, 8, 3));
        entry.set_date(date(2026, 8, 4));
        assert_eq!(entry.date(), date(2026, 8, 4));
    }

    #[test]
    fn weekend_construction_falls_back_to_friday() {
        let entry = TimeEntry::new(1, None, date(2026, 8, 9), 1.0, String::new());
        assert_eq!(entry.date(), date(2026, 8, 7));
    }

    #[test]
    fn hours_round_to_quarters_and_clamp() {
        let mut entry = TimeEntry::new(1, None, date(2026, 8, 3), 0.0, String::new());

        entry.set_hours(0.3);
        assert_eq!(entry.hours(), 0.25);
        entry.set_hours(1.1);
        assert_eq!(entry.hours(), 1.0);
        entry.set_hours(25.0);
        assert_eq!(entry.hours(), 24.0);
        entry.set_hours(-1.0);
        assert_eq!(entry.hours(), 0.0);
        entry.set_hours(1.125);
        assert_eq!(entry.hours(), 1.25);
    }

    #[test]
    fn week_start_and_reference_formatting() {
        let entry = TimeEntry::new(100, Some(5), date(2026, 8, 6), 2.0, String::new());
        assert_eq!(entry.week_start(), date(2026, 8, 3));
        assert_eq!(entry.project_reference(), "Project-100.5");

        let generic = TimeEntry::new(200, None, date(2026, 8, 6), 1.0, String::new());
        assert_eq!(generic.project_reference(), "Generic-200");
    }

    #[test]
    fn cursor_rejects_weekends_and_steps_around_them() {
        let mut sheet = TimeSheet::new(vec![], date(2026, 8, 7)); // Friday
        assert!(!sheet.set_selected_date(date(2026, 8, 8)));
        assert_eq!(sheet.selected_date(), date(2026, 8, 7));

        sheet.next_day();
        assert_eq!(sheet.selected_date(), date(2026, 8, 10)); // Monday
        sheet.previous_day();
        assert_eq!(sheet.selected_date(), date(2026, 8, 7));

        sheet.next_week();
        assert_eq!(sheet.selected_date(), date(2026, 8, 14));
        sheet.previous_week();
        sheet.current_week();
        assert_eq!(sheet.selected_date(), date(2026, 8, 3));
    }

    #[test]
    fn weekend_start_clamps_forward_to_monday() {
        let sheet = TimeSheet::new(vec![], date(2026, 8, 8));
        assert_eq!(sheet.selected_date(), date(2026, 8, 10));
    }

    #[test]
    fn week_view_filters_and_sorts() {
        let entries = vec![
            TimeEntry::new(200, None, date(2026, 8, 3), 1.0, String::new()),
            TimeEntry::new(100, Some(5), date(2026, 8, 5), 3.0, String::new()),
            TimeEntry::new(100, Some(5), date(2026, 8, 3), 2.0, String::new()),
            TimeEntry::new(100, Some(5), date(2026, 8, 12), 4.0, String::new()),
        ];
        let sheet = TimeSheet::new(entries, date(2026, 8, 6));

        let week = sheet.current_week_entries();
        assert_eq!(week.len(), 3);
        // Both Monday entries first, ordered by id1.
        assert_eq!(week[0].id1, 100);
        assert_eq!(week[1].id1, 200);
        assert_eq!(week[2].date(), date(2026, 8, 5));

        assert_eq!(sheet.day_total(date(2026, 8, 3)), 3.0);
        assert_eq!(sheet.week_total(), 6.0);
    }
}
