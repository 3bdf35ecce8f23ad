use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::export::ExportFormat;

/// A named, reusable field-selection + format preset for flat exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProfile {
    pub name: String,
    pub fields: Vec<String>,
    pub format: ExportFormat,

    #[serde(default)]
    pub usage_count: u64,

    #[serde(default)]
    pub last_used: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(default)]
    profiles: Vec<ExportProfile>,
}

impl ProfileStore {
    #[tracing::instrument(skip(path))]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(file = %path.display(), "no profile store yet; starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let store: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(count = store.profiles.len(), "loaded profiles");
        Ok(store)
    }

    #[tracing::instrument(skip(self, path))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let serialized = toml::to_string_pretty(self).context("failed to serialize profiles")?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExportProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Inserting under an existing name replaces the preset but keeps its
    /// usage history.
    pub fn upsert(&mut self, mut profile: ExportProfile) {
        if let Some(existing) = self
            .profiles
            .iter_mut()
            .find(|candidate| candidate.name == profile.name)
        {
            profile.usage_count = existing.usage_count;
            profile.last_used = existing.last_used;
            *existing = profile;
        } else {
            self.profiles.push(profile);
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.profiles.len();
        self.profiles.retain(|profile| profile.name != name);
        before != self.profiles.len()
    }

    #[must_use]
    pub fn list(&self) -> Vec<&ExportProfile> {
        let mut sorted: Vec<&ExportProfile> = self.profiles.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    pub fn record_use(&mut self, name: &str, today: NaiveDate) -> anyhow::Result<()> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|profile| profile.name == name)
            .ok_or_else(|| anyhow!("unknown profile: {name}"))?;
        profile.usage_count += 1;
        profile.last_used = Some(today);
        info!(name, count = profile.usage_count, "recorded profile use");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{ExportProfile, ProfileStore};
    use crate::export::ExportFormat;

    fn profile(name: &str) -> ExportProfile {
        ExportProfile {
            name: name.to_string(),
            fields: vec!["customer".to_string(), "total".to_string()],
            format: ExportFormat::Csv,
            usage_count: 0,
            last_used: None,
        }
    }

    #[test]
    fn roundtrips_through_toml() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("profiles.toml");

        let mut store = ProfileStore::default();
        store.upsert(profile("weekly"));
        store.upsert(profile("audit"));
        store.save(&path).expect("save");

        let loaded = ProfileStore::load(&path).expect("load");
        assert_eq!(loaded.list().len(), 2);
        assert_eq!(loaded.list()[0].name, "audit");
        assert_eq!(loaded.get("weekly").expect("weekly").fields.len(), 2);
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let store = ProfileStore::load(&temp.path().join("absent.toml")).expect("load");
        assert!(store.list().is_empty());
    }

    #[test]
    fn record_use_increments_and_stamps() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).expect("valid date");
        let mut store = ProfileStore::default();
        store.upsert(profile("weekly"));

        store.record_use("weekly", today).expect("known profile");
        store.record_use("weekly", today).expect("known profile");
        let used = store.get("weekly").expect("weekly");
        assert_eq!(used.usage_count, 2);
        assert_eq!(used.last_used, Some(today));

        assert!(store.record_use("absent", today).is_err());
    }

    #[test]
    fn upsert_replaces_but_keeps_history() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).expect("valid date");
        let mut store = ProfileStore::default();
        store.upsert(profile("weekly"));
        store.record_use("weekly", today).expect("known profile");

        let mut replacement = profile("weekly");
        replacement.format = ExportFormat::Json;
        store.upsert(replacement);

        let kept = store.get("weekly").expect("weekly");
        assert_eq!(kept.format, ExportFormat::Json);
        assert_eq!(kept.usage_count, 1);

        assert!(store.remove("weekly"));
        assert!(!store.remove("weekly"));
    }
}
