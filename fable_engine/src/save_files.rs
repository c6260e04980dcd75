//! Save-game discovery and serialization helpers.
//!
//! A save is a RON blob holding the progression snapshot (facts, event pointers, score and
//! move count) plus the version and uuid of the game it belongs to. Slot files are named
//! `{slot}-fable-{version}.ron`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::FABLE_VERSION;
use crate::progression::ProgressionSnapshot;
use crate::slug::sanitize_slug;

pub const SAVE_DIR: &str = "saved_games";

/// Everything written to a save slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGame {
    pub version: String,
    pub game_uuid: String,
    pub progression: ProgressionSnapshot,
}

impl SavedGame {
    pub fn new(game_uuid: impl Into<String>, progression: ProgressionSnapshot) -> Self {
        Self {
            version: FABLE_VERSION.to_string(),
            game_uuid: game_uuid.into(),
            progression,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    pub slot: String,
    pub version: String,
    pub path: PathBuf,
    pub file_name: String,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub game_uuid: String,
    pub moves: usize,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveFileStatus {
    Ready,
    VersionMismatch { save_version: String, current_version: String },
    Corrupted { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFileEntry {
    pub slot: String,
    pub version: String,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub summary: Option<SaveSummary>,
    pub status: SaveFileStatus,
}

/// Per-game save directory under [`SAVE_DIR`].
pub fn save_dir_for_game(raw: &str) -> PathBuf {
    PathBuf::from(SAVE_DIR).join(sanitize_slug(raw))
}

/// Path of `slot` inside `dir` for the running engine version.
pub fn slot_path(dir: &Path, slot: &str) -> PathBuf {
    dir.join(format!("{}-fable-{FABLE_VERSION}.ron", sanitize_slug(slot)))
}

/// Write `save` to `slot` in `dir`, creating the directory if needed.
///
/// # Errors
/// Returns an error if the directory cannot be created or the file cannot be written.
pub fn write_save_file(dir: &Path, slot: &str, save: &SavedGame) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating save directory {}", dir.display()))?;
    let path = slot_path(dir, slot);
    let ron = ron::ser::to_string_pretty(save, ron::ser::PrettyConfig::default())
        .with_context(|| format!("serializing save slot '{slot}'"))?;
    fs::write(&path, ron).with_context(|| format!("writing save file {}", path.display()))?;
    info!("game saved to '{}'", path.display());
    Ok(path)
}

/// Load a save file from disk.
///
/// # Errors
/// Returns an error if the file cannot be read or deserialized.
pub fn load_save_file(path: &Path) -> Result<SavedGame> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading save file {}", path.display()))?;
    ron::from_str::<SavedGame>(&raw).with_context(|| format!("parsing save file {}", path.display()))
}

/// Discover save slot files stored in `dir`.
///
/// # Errors
/// Returns an error if the directory contents cannot be read or enumerated.
pub fn collect_save_slots(dir: &Path) -> Result<Vec<SaveSlot>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut slots = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry.with_context(|| format!("enumerating {}", dir.display()))?;
        if let Some(slot) = slot_from_entry(&entry) {
            slots.push(slot);
        }
    }
    slots.sort_by(|a, b| a.slot.cmp(&b.slot).then(a.version.cmp(&b.version)));
    Ok(slots)
}

/// Build descriptive entries for save files located in `dir`, newest first.
///
/// # Errors
/// Returns an error if reading the directory fails.
pub fn build_save_entries(dir: &Path) -> Result<Vec<SaveFileEntry>> {
    let slots = collect_save_slots(dir)?;
    let mut entries: Vec<_> = slots.into_iter().map(entry_for_slot).collect();
    entries.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.slot.cmp(&b.slot)));
    Ok(entries)
}

/// Format a human-friendly modified time relative to now.
pub fn format_modified(modified: SystemTime) -> String {
    match SystemTime::now().duration_since(modified) {
        Ok(delta) => format_duration(delta),
        Err(_) => "in the future".to_string(),
    }
}

fn entry_for_slot(slot: SaveSlot) -> SaveFileEntry {
    let mut version = slot.version.clone();
    let (summary, status) = match fs::read_to_string(&slot.path) {
        Ok(raw) => match ron::from_str::<SavedGame>(&raw) {
            Ok(save) => {
                version.clone_from(&save.version);
                let status = if save.version == FABLE_VERSION {
                    SaveFileStatus::Ready
                } else {
                    SaveFileStatus::VersionMismatch {
                        save_version: save.version.clone(),
                        current_version: FABLE_VERSION.to_string(),
                    }
                };
                let summary = SaveSummary {
                    game_uuid: save.game_uuid.clone(),
                    moves: save.progression.moves,
                    score: save.progression.score,
                };
                (Some(summary), status)
            },
            Err(err) => {
                warn!("failed to parse save '{}' ({}): {err}", slot.slot, slot.path.display());
                (
                    None,
                    SaveFileStatus::Corrupted {
                        message: format!("parse error: {}", trim_error(&err)),
                    },
                )
            },
        },
        Err(err) => {
            warn!("failed to read save '{}' ({}): {err}", slot.slot, slot.path.display());
            (
                None,
                SaveFileStatus::Corrupted {
                    message: format!("read error: {}", trim_error(&err)),
                },
            )
        },
    };

    SaveFileEntry {
        slot: slot.slot,
        version,
        path: slot.path,
        modified: slot.modified,
        summary,
        status,
    }
}

fn slot_from_entry(entry: &fs::DirEntry) -> Option<SaveSlot> {
    let path = entry.path();
    if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
        return None;
    }
    let file_name = path.file_name().and_then(|name| name.to_str())?.to_string();
    let stem = path.file_stem().and_then(|stem| stem.to_str())?;
    let (slot, version) = stem.rsplit_once("-fable-")?;
    if slot.is_empty() {
        return None;
    }
    let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
    Some(SaveSlot {
        slot: slot.to_string(),
        version: version.to_string(),
        path,
        file_name,
        modified,
    })
}

/// Convert a duration into a compact "time ago" string.
fn format_duration(duration: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = MINUTE * 60;
    const DAY: u64 = HOUR * 24;
    const WEEK: u64 = DAY * 7;

    let secs = duration.as_secs();
    if secs < 30 {
        "just now".to_string()
    } else if secs < MINUTE {
        format!("{secs}s ago")
    } else if secs < HOUR {
        format!("{}m ago", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h ago", secs / HOUR)
    } else if secs < WEEK {
        format!("{}d ago", secs / DAY)
    } else {
        format!("{}w ago", secs / WEEK)
    }
}

/// Clamp verbose error messages to a readable length.
fn trim_error(err: &impl ToString) -> String {
    let message = err.to_string();
    if message.chars().count() <= 120 {
        return message;
    }
    let mut trimmed: String = message.chars().take(117).collect();
    trimmed.push_str("...");
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn snapshot() -> ProgressionSnapshot {
        ProgressionSnapshot {
            facts: Vec::new(),
            trackers: Vec::new(),
            score: 2,
            moves: 7,
        }
    }

    #[test]
    fn collect_save_slots_handles_missing_directory() -> Result<()> {
        let dir = tempdir()?;
        assert!(collect_save_slots(&dir.path().join("missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn collect_save_slots_skips_invalid_files() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path();
        fs::write(path.join("alpha-fable-0.1.0.ron"), "()")?;
        fs::write(path.join("notes.txt"), "ignore me")?;
        fs::create_dir_all(path.join("nested"))?;

        let slots = collect_save_slots(path)?;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slot, "alpha");
        assert_eq!(slots[0].version, "0.1.0");
        Ok(())
    }

    #[test]
    fn written_saves_load_back() -> Result<()> {
        let dir = tempdir()?;
        let save = SavedGame::new("game-1", snapshot());
        let path = write_save_file(dir.path(), "Slot One", &save)?;
        assert!(path.ends_with(format!("slot-one-fable-{FABLE_VERSION}.ron")));
        assert_eq!(load_save_file(&path)?, save);
        Ok(())
    }

    #[test]
    fn build_save_entries_reports_status_variants() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path();
        write_save_file(path, "alpha", &SavedGame::new("game-1", snapshot()))?;

        let mut old = SavedGame::new("game-1", snapshot());
        old.version = "0.0.1".into();
        fs::write(path.join("beta-fable-0.0.1.ron"), ron::ser::to_string(&old)?)?;
        fs::write(path.join("gamma-fable-0.0.1.ron"), "this is not valid ron")?;

        let entries = build_save_entries(path)?;
        let find = |slot: &str| entries.iter().find(|entry| entry.slot == slot).unwrap();

        assert_eq!(find("alpha").status, SaveFileStatus::Ready);
        assert_eq!(find("alpha").summary.as_ref().unwrap().moves, 7);
        assert!(matches!(find("beta").status, SaveFileStatus::VersionMismatch { .. }));
        assert_eq!(find("beta").version, "0.0.1");
        assert!(matches!(find("gamma").status, SaveFileStatus::Corrupted { .. }));
        assert!(find("gamma").summary.is_none());
        Ok(())
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_secs(5)), "just now");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600)), "3h ago");
        assert_eq!(trim_error(&"x".repeat(200)).chars().count(), 120);
    }
}
