use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// What a write actually did; unchanged content touches nothing on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteWrite {
    Unchanged,
    Created,
    Updated { backup: PathBuf },
}

/// ASCII alphanumerics, `-` and `_` pass through; any run of anything else
/// collapses to a single `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
            gap = false;
        } else if !gap {
            out.push('_');
            gap = true;
        }
    }
    out
}

/// `notes/{id1}_{sanitized-name}_{type}.txt` under the data directory.
#[must_use]
pub fn note_path(notes_dir: &Path, id1: i64, name: &str, note_type: &str) -> PathBuf {
    notes_dir.join(format!(
        "{id1}_{}_{}.txt",
        sanitize_name(name),
        sanitize_name(note_type)
    ))
}

pub fn read_note(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("failed to read note {}", path.display()))
}

/// Overwrites the note atomically, first copying the old content to a
/// timestamped `.bak` sibling when it differs from the new content.
#[tracing::instrument(skip(path, content, now))]
pub fn write_note(path: &Path, content: &str, now: NaiveDateTime) -> anyhow::Result<NoteWrite> {
    let existing = read_note(path)?;

    if existing.as_deref() == Some(content) {
        debug!(file = %path.display(), "note content unchanged; not writing");
        return Ok(NoteWrite::Unchanged);
    }

    let backup = match existing {
        Some(_) => {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| anyhow!("note path has no file name: {}", path.display()))?;
            let backup = path.with_file_name(format!(
                "{stem}.{}.bak",
                now.format("%Y%m%dT%H%M%S")
            ));
            fs::copy(path, &backup)
                .with_context(|| format!("failed to back up note to {}", backup.display()))?;
            info!(backup = %backup.display(), "backed up note before overwrite");
            Some(backup)
        }
        None => None,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(match backup {
        Some(backup) => NoteWrite::Updated { backup },
        None => NoteWrite::Created,
    })
}
