use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::profile::ProfileStore;
use crate::task::TaskItem;
use crate::timesheet::TimeEntry;

/// File-per-concern data directory. Every save is an atomic full
/// overwrite; nothing is updated in place.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub time_path: PathBuf,
    pub selection_path: PathBuf,
    pub cursor_path: PathBuf,
    pub profiles_path: PathBuf,
    pub notes_dir: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let time_path = data_dir.join("time.json");
        let selection_path = data_dir.join("selection.data");
        let cursor_path = data_dir.join("cursor.data");
        let profiles_path = data_dir.join("profiles.toml");
        let notes_dir = data_dir.join("notes");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "[]\n")?;
        }
        if !time_path.exists() {
            fs::write(&time_path, "[]\n")?;
        }
        if !selection_path.exists() {
            fs::write(&selection_path, "")?;
        }
        if !cursor_path.exists() {
            fs::write(&cursor_path, "")?;
        }
        if !profiles_path.exists() {
            fs::write(&profiles_path, "")?;
        }
        fs::create_dir_all(&notes_dir)
            .with_context(|| format!("failed to create {}", notes_dir.display()))?;

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            time = %time_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            time_path,
            selection_path,
            cursor_path,
            profiles_path,
            notes_dir,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_forest(&self) -> anyhow::Result<Vec<TaskItem>> {
        load_json(&self.tasks_path).context("failed to load tasks.json")
    }

    #[tracing::instrument(skip(self, forest))]
    pub fn save_forest(&self, forest: &[TaskItem]) -> anyhow::Result<()> {
        save_json_atomic(&self.tasks_path, forest).context("failed to save tasks.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_entries(&self) -> anyhow::Result<Vec<TimeEntry>> {
        load_json(&self.time_path).context("failed to load time.json")
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn save_entries(&self, entries: &[TimeEntry]) -> anyhow::Result<()> {
        save_json_atomic(&self.time_path, entries).context("failed to save time.json")
    }

    /// The persisted selection pointer. An unparsable file is treated as no
    /// selection rather than an error.
    #[tracing::instrument(skip(self))]
    pub fn get_selection(&self) -> anyhow::Result<Option<Uuid>> {
        let raw = fs::read_to_string(&self.selection_path)
            .with_context(|| format!("failed reading {}", self.selection_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match trimmed.parse::<Uuid>() {
            Ok(uuid) => Ok(Some(uuid)),
            Err(err) => {
                warn!(error = %err, "ignoring malformed selection file");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_selection(&self, selection: Option<Uuid>) -> anyhow::Result<()> {
        let payload = selection.map(|uuid| uuid.to_string()).unwrap_or_default();
        fs::write(&self.selection_path, payload)
            .with_context(|| format!("failed writing {}", self.selection_path.display()))?;
        Ok(())
    }

    /// The ledger cursor, `YYYY-MM-DD`. Same lenient policy as the
    /// selection pointer.
    #[tracing::instrument(skip(self))]
    pub fn get_cursor(&self) -> anyhow::Result<Option<chrono::NaiveDate>> {
        let raw = fs::read_to_string(&self.cursor_path)
            .with_context(|| format!("failed reading {}", self.cursor_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(date) => Ok(Some(date)),
            Err(err) => {
                warn!(error = %err, "ignoring malformed cursor file");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_cursor(&self, date: chrono::NaiveDate) -> anyhow::Result<()> {
        fs::write(&self.cursor_path, date.format("%Y-%m-%d").to_string())
            .with_context(|| format!("failed writing {}", self.cursor_path.display()))?;
        Ok(())
    }

    pub fn load_profiles(&self) -> anyhow::Result<ProfileStore> {
        ProfileStore::load(&self.profiles_path)
    }

    pub fn save_profiles(&self, store: &ProfileStore) -> anyhow::Result<()> {
        store.save(&self.profiles_path)
    }
}

#[tracing::instrument(skip(path))]
fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading json array");
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let out: Vec<T> = serde_json::from_str(trimmed)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    debug!(count = out.len(), "loaded records");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_json_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(records)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
