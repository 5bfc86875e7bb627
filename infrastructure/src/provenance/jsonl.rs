//! JSONL-backed provenance ledger.
//!
//! Each record is serialized as a single JSON line with a `type` field
//! (`activity` or `entity`) and an RFC3339 `timestamp`, appended and flushed
//! before it becomes visible to readers. Opening an existing file replays it.

use super::memory::InMemoryLedger;
use async_trait::async_trait;
use semantra_application::ports::provenance_ledger::{LedgerError, ProvenanceLedger};
use semantra_domain::{Activity, ActivityId, ActivityKind, AgentId, EntityId, EntityKind, ProvEntity};
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub struct JsonlProvenanceLedger {
    index: InMemoryLedger,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlProvenanceLedger {
    /// Open (or create) the ledger file at `path`.
    ///
    /// Creates parent directories. Lines that cannot be read are skipped
    /// with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| write_failed(path, e))?;
        }

        let index = InMemoryLedger::new();
        if path.exists() {
            let replayed = replay(path, &index)?;
            debug!("Replayed {} provenance record(s) from {}", replayed, path.display());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_failed(path, e))?;
        Ok(Self {
            index,
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<T: Serialize>(&self, record_type: &str, record: &T) -> Result<(), LedgerError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut value =
            serde_json::to_value(record).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("type".to_string(), Value::String(record_type.to_string()));
            map.insert("timestamp".to_string(), Value::String(timestamp));
        }
        let line =
            serde_json::to_string(&value).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| LedgerError::WriteFailed("ledger writer poisoned".to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| write_failed(&self.path, e))?;
        writer.flush().map_err(|e| write_failed(&self.path, e))
    }
}

fn write_failed(path: &Path, e: std::io::Error) -> LedgerError {
    LedgerError::WriteFailed(format!("{}: {}", path.display(), e))
}

/// Load every readable record of `path` into `index`.
fn replay(path: &Path, index: &InMemoryLedger) -> Result<usize, LedgerError> {
    let file = File::open(path).map_err(|e| write_failed(path, e))?;
    let mut count = 0;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| write_failed(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: Result<Value, _> = serde_json::from_str(&line);
        let outcome = match parsed {
            Ok(value) => match value.get("type").and_then(Value::as_str) {
                Some("activity") => serde_json::from_value::<Activity>(value)
                    .map_err(|e| e.to_string())
                    .and_then(|a| index.put_activity(a).map_err(|e| e.to_string())),
                Some("entity") => serde_json::from_value::<ProvEntity>(value)
                    .map_err(|e| e.to_string())
                    .and_then(|e| index.put_entity(e).map_err(|e| e.to_string())),
                other => Err(format!("unknown record type {other:?}")),
            },
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(()) => count += 1,
            Err(e) => warn!("Skipping {} line {}: {}", path.display(), number + 1, e),
        }
    }
    Ok(count)
}

#[async_trait]
impl ProvenanceLedger for JsonlProvenanceLedger {
    async fn record_activity(
        &self,
        kind: ActivityKind,
        actor: &AgentId,
        params: Value,
    ) -> Result<ActivityId, LedgerError> {
        let activity = InMemoryLedger::new_activity(kind, actor, params);
        self.append("activity", &activity)?;
        let id = activity.id.clone();
        self.index.put_activity(activity)?;
        Ok(id)
    }

    async fn record_entity(
        &self,
        kind: EntityKind,
        value: Value,
        generated_by: &ActivityId,
        derived_from: &[EntityId],
    ) -> Result<EntityId, LedgerError> {
        let entity = self.index.new_entity(kind, value, generated_by, derived_from)?;
        self.append("entity", &entity)?;
        let id = entity.id.clone();
        self.index.put_entity(entity)?;
        Ok(id)
    }

    async fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, LedgerError> {
        self.index.activity(id).await
    }

    async fn entity(&self, id: &EntityId) -> Result<Option<ProvEntity>, LedgerError> {
        self.index.entity(id).await
    }
}

impl Drop for JsonlProvenanceLedger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
