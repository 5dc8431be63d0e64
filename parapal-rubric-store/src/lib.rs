use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parapal_protocol::{Rubric, Standard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

static ENTRY_COUNTER: AtomicU64 = AtomicU64::new(1);

const JOURNAL_FILE_NAME: &str = "rubric-journal.jsonl";
const RUBRIC_SAVED: &str = "rubric_saved";
const RUBRIC_DELETED: &str = "rubric_deleted";
const STANDARD_SAVED: &str = "standard_saved";
const STANDARD_DELETED: &str = "standard_deleted";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    pub timestamp_ms: u64,
    pub timestamp_iso: String,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricStoreConfig {
    pub root_dir: PathBuf,
    pub seed_starter_rubrics: bool,
}

#[derive(Debug, Error)]
pub enum RubricStoreError {
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rubrics and standards kept as an append-only journal. The current
/// collection is the replay of every entry in file order.
#[derive(Debug, Clone)]
pub struct RubricStore {
    cfg: RubricStoreConfig,
}

#[derive(Debug, Default)]
struct Collections {
    rubrics: Vec<Rubric>,
    standards: Vec<Standard>,
}

impl RubricStore {
    pub fn open(cfg: RubricStoreConfig) -> Result<Self, RubricStoreError> {
        fs::create_dir_all(&cfg.root_dir)?;
        let store = Self { cfg };
        if store.cfg.seed_starter_rubrics && !store.journal_path().exists() {
            for rubric in starter_rubrics() {
                store.append_entry(RUBRIC_SAVED, serde_json::to_value(&rubric)?)?;
            }
        }
        Ok(store)
    }

    pub fn root_dir(&self) -> &Path {
        self.cfg.root_dir.as_path()
    }

    pub fn save_rubric(&self, rubric: &Rubric) -> Result<Rubric, RubricStoreError> {
        let id = rubric.id.trim();
        if id.is_empty() {
            return Err(invalid("rubric", "id cannot be empty"));
        }
        if rubric.name.trim().is_empty() && rubric.content_text().is_none() {
            return Err(invalid("rubric", "a name or rubric content is required"));
        }
        let stored = Rubric {
            id: id.to_string(),
            ..rubric.clone()
        };
        self.append_entry(RUBRIC_SAVED, serde_json::to_value(&stored)?)?;
        Ok(stored)
    }

    pub fn list_rubrics(&self) -> Result<Vec<Rubric>, RubricStoreError> {
        Ok(self.replay()?.rubrics)
    }

    pub fn get_rubric(&self, id: &str) -> Result<Option<Rubric>, RubricStoreError> {
        let id = id.trim();
        Ok(self
            .list_rubrics()?
            .into_iter()
            .find(|rubric| rubric.id == id))
    }

    /// Returns whether a rubric was removed; unknown ids are a no-op.
    pub fn delete_rubric(&self, id: &str) -> Result<bool, RubricStoreError> {
        let id = id.trim();
        if self.get_rubric(id)?.is_none() {
            return Ok(false);
        }
        self.append_entry(RUBRIC_DELETED, serde_json::json!({ "id": id }))?;
        Ok(true)
    }

    pub fn save_standard(&self, standard: &Standard) -> Result<Standard, RubricStoreError> {
        let code = standard.code.trim();
        if code.is_empty() {
            return Err(invalid("standard", "StandardCode cannot be empty"));
        }
        let stored = Standard {
            code: code.to_string(),
            description: standard.description.trim().to_string(),
        };
        self.append_entry(STANDARD_SAVED, serde_json::to_value(&stored)?)?;
        Ok(stored)
    }

    pub fn list_standards(&self) -> Result<Vec<Standard>, RubricStoreError> {
        Ok(self.replay()?.standards)
    }

    pub fn delete_standard(&self, code: &str) -> Result<bool, RubricStoreError> {
        let code = code.trim();
        if !self
            .list_standards()?
            .iter()
            .any(|standard| standard.code == code)
        {
            return Ok(false);
        }
        self.append_entry(STANDARD_DELETED, serde_json::json!({ "code": code }))?;
        Ok(true)
    }

    /// Looks up standards in the order the codes were given.
    pub fn standards_by_codes(&self, codes: &[String]) -> Result<Vec<Standard>, RubricStoreError> {
        let stored = self.list_standards()?;
        codes
            .iter()
            .map(|code| {
                let code = code.trim();
                stored
                    .iter()
                    .find(|standard| standard.code == code)
                    .cloned()
                    .ok_or_else(|| RubricStoreError::NotFound {
                        kind: "standard",
                        id: code.to_string(),
                    })
            })
            .collect()
    }

    fn append_entry(&self, event_type: &str, payload: Value) -> Result<(), RubricStoreError> {
        let (timestamp_ms, timestamp_iso) = now_timestamp();
        let entry = JournalEntry {
            id: format!(
                "rub-{}-{}",
                timestamp_ms,
                ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed)
            ),
            timestamp_ms,
            timestamp_iso,
            event_type: event_type.to_string(),
            payload,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())?;
        let line = serde_json::to_string(&entry)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    fn replay(&self) -> Result<Collections, RubricStoreError> {
        let mut collections = Collections::default();
        let entries = read_entries(self.journal_path().as_path())?;
        debug!(entries = entries.len(), "replaying rubric journal");
        for entry in entries {
            match entry.event_type.as_str() {
                RUBRIC_SAVED => match serde_json::from_value::<Rubric>(entry.payload) {
                    Ok(rubric) => upsert(&mut collections.rubrics, rubric, |item| item.id.clone()),
                    Err(err) => warn!(entry = %entry.id, error = %err, "skipping malformed rubric"),
                },
                RUBRIC_DELETED => {
                    if let Some(id) = entry.payload.get("id").and_then(Value::as_str) {
                        collections.rubrics.retain(|rubric| rubric.id != id);
                    }
                }
                STANDARD_SAVED => match serde_json::from_value::<Standard>(entry.payload) {
                    Ok(standard) => {
                        upsert(&mut collections.standards, standard, |item| item.code.clone())
                    }
                    Err(err) => warn!(entry = %entry.id, error = %err, "skipping malformed standard"),
                },
                STANDARD_DELETED => {
                    if let Some(code) = entry.payload.get("code").and_then(Value::as_str) {
                        collections.standards.retain(|standard| standard.code != code);
                    }
                }
                other => debug!(event_type = other, "skipping unknown journal entry"),
            }
        }
        Ok(collections)
    }

    fn journal_path(&self) -> PathBuf {
        self.cfg.root_dir.join(JOURNAL_FILE_NAME)
    }
}

pub fn starter_rubrics() -> Vec<Rubric> {
    vec![
        Rubric {
            id: "r1".to_string(),
            name: "Narrative Writing (Grade 4)".to_string(),
            description: "Checks sequence, detail, and a satisfying ending.".to_string(),
            content: None,
            criteria: Vec::new(),
        },
        Rubric {
            id: "r2".to_string(),
            name: "Opinion Writing (Grade 5)".to_string(),
            description: "Focuses on stance, reasons, and evidence.".to_string(),
            content: None,
            criteria: Vec::new(),
        },
    ]
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> String) {
    let item_key = key(&item);
    match items.iter().position(|existing| key(existing) == item_key) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

fn invalid(kind: &'static str, reason: &str) -> RubricStoreError {
    RubricStoreError::Invalid {
        kind,
        reason: reason.to_string(),
    }
}

fn read_entries(path: &Path) -> Result<Vec<JournalEntry>, RubricStoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let raw = line?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(line = line_number + 1, error = %err, "skipping malformed journal line"),
        }
    }
    Ok(entries)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn now_timestamp() -> (u64, String) {
    let ms = now_millis();
    let iso = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| format!("{ms}"));
    (ms, iso)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(root: &Path, seed: bool) -> RubricStore {
        RubricStore::open(RubricStoreConfig {
            root_dir: root.to_path_buf(),
            seed_starter_rubrics: seed,
        })
        .expect("open store")
    }

    fn rubric(id: &str, name: &str) -> Rubric {
        Rubric {
            id: id.to_string(),
            name: name.to_string(),
            ..Rubric::default()
        }
    }

    #[test]
    fn seeds_starter_rubrics_only_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), true);
        assert_eq!(store.list_rubrics().expect("list").len(), 2);

        store.delete_rubric("r1").expect("delete");
        let reopened = open_store(dir.path(), true);
        let names = reopened
            .list_rubrics()
            .expect("list")
            .into_iter()
            .map(|rubric| rubric.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Opinion Writing (Grade 5)".to_string()]);
    }

    #[test]
    fn save_replaces_in_place_and_keeps_insertion_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), false);

        store.save_rubric(&rubric("a", "First")).expect("save a");
        store.save_rubric(&rubric("b", "Second")).expect("save b");
        store.save_rubric(&rubric("a", "First, revised")).expect("resave a");

        let names = store
            .list_rubrics()
            .expect("list")
            .into_iter()
            .map(|rubric| rubric.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["First, revised".to_string(), "Second".to_string()]);
        assert_eq!(
            store.get_rubric("b").expect("get").map(|rubric| rubric.name),
            Some("Second".to_string())
        );
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), false);
        store.save_rubric(&rubric("a", "First")).expect("save");

        assert!(store.delete_rubric("a").expect("delete existing"));
        assert!(!store.delete_rubric("a").expect("delete again"));
        assert!(!store.delete_rubric("missing").expect("delete unknown"));
        assert!(store.list_rubrics().expect("list").is_empty());
    }

    #[test]
    fn malformed_journal_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), false);
        store.save_rubric(&rubric("a", "First")).expect("save a");

        let journal = dir.path().join(JOURNAL_FILE_NAME);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&journal)
            .expect("open journal");
        file.write_all(b"{not json\n").expect("write garbage");
        file.write_all(
            br#"{"id":"x","timestamp_ms":1,"timestamp_iso":"","event_type":"rubric_saved","payload":{"name":"no id"}}"#,
        )
        .expect("write bad payload");
        file.write_all(b"\n").expect("newline");

        store.save_rubric(&rubric("b", "Second")).expect("save after garbage");
        let ids = store
            .list_rubrics()
            .expect("list")
            .into_iter()
            .map(|rubric| rubric.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert!(store.delete_rubric("a").expect("delete"));
    }

    #[test]
    fn rejects_rubrics_without_id_or_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), false);

        let err = store.save_rubric(&rubric("  ", "Name")).expect_err("blank id");
        assert!(matches!(err, RubricStoreError::Invalid { kind: "rubric", .. }));
        let err = store.save_rubric(&rubric("x", "  ")).expect_err("blank name");
        assert!(matches!(err, RubricStoreError::Invalid { .. }));

        let content_only = Rubric {
            id: "c".to_string(),
            content: Some("Score 1-4 on voice.".to_string()),
            ..Rubric::default()
        };
        store.save_rubric(&content_only).expect("content-only rubric is valid");
    }

    #[test]
    fn standards_round_through_journal_and_lookup_by_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), false);
        for (code, description) in [("W.4.1", "Opinion"), ("W.4.2", "Informative"), ("W.4.3", "Narrative")] {
            store
                .save_standard(&Standard {
                    code: code.to_string(),
                    description: description.to_string(),
                })
                .expect("save standard");
        }
        assert!(store.delete_standard("W.4.2").expect("delete standard"));

        let selected = store
            .standards_by_codes(&["W.4.3".to_string(), "W.4.1".to_string()])
            .expect("lookup");
        let codes = selected.iter().map(|s| s.code.as_str()).collect::<Vec<_>>();
        assert_eq!(codes, vec!["W.4.3", "W.4.1"]);

        let err = store
            .standards_by_codes(&["W.4.2".to_string()])
            .expect_err("deleted code");
        assert!(matches!(err, RubricStoreError::NotFound { kind: "standard", ref id } if id == "W.4.2"));
    }
}
