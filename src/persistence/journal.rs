//! Append-only execution journal.
//!
//! Holds one [`ExecutionRecord`] per pipeline run plus any
//! [`ReconciliationRecord`]s. Entries are never updated or removed. When a
//! file path is configured every entry is also appended as one JSON line.
//! Readers never wait on that file write; failed mirror writes are counted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::{ExecutionRecord, ReconciliationRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    Execution(ExecutionRecord),
    Reconciliation(ReconciliationRecord),
}

impl JournalEntry {
    pub fn intent_id(&self) -> Uuid {
        match self {
            JournalEntry::Execution(r) => r.intent_id,
            JournalEntry::Reconciliation(r) => r.intent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub seq: u64,
    #[serde(flatten)]
    pub entry: JournalEntry,
}

#[derive(Debug, Default)]
pub struct ExecutionJournal {
    entries: RwLock<Vec<StoredEntry>>,
    path: Option<PathBuf>,
    file_guard: Mutex<()>,
    mirror_failures: AtomicU64,
}

impl ExecutionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also mirror entries to a JSON-lines file
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub async fn append_execution(&self, record: ExecutionRecord) -> u64 {
        self.append(JournalEntry::Execution(record)).await
    }

    pub async fn append_reconciliation(&self, record: ReconciliationRecord) -> u64 {
        warn!(
            intent_id = %record.intent_id,
            tx_id = %record.tx_id,
            reason = %record.reason,
            "Reconciliation required"
        );
        self.append(JournalEntry::Reconciliation(record)).await
    }

    async fn append(&self, entry: JournalEntry) -> u64 {
        let mut entries = self.entries.write().await;
        let stored = StoredEntry {
            seq: entries.len() as u64 + 1,
            entry,
        };
        let seq = stored.seq;
        debug!(seq, intent_id = %stored.entry.intent_id(), "Journal entry appended");

        let Some(path) = &self.path else {
            entries.push(stored);
            return seq;
        };

        let line = serde_json::to_vec(&stored);
        entries.push(stored);
        // Taken before the entries lock is released so file order matches seq order
        let _file = self.file_guard.lock().await;
        drop(entries);

        let written = match line {
            Ok(line) => Self::write_line(path, line).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            self.mirror_failures.fetch_add(1, Ordering::Relaxed);
            error!(seq, path = %path.display(), error = %e, "Failed to mirror journal entry");
        }
        seq
    }

    async fn write_line(path: &Path, mut line: Vec<u8>) -> crate::error::Result<()> {
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn executions(&self) -> Vec<ExecutionRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|s| match &s.entry {
                JournalEntry::Execution(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn reconciliations(&self) -> Vec<ReconciliationRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|s| match &s.entry {
                JournalEntry::Reconciliation(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn entries_for(&self, intent_id: Uuid) -> Vec<StoredEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|s| s.entry.intent_id() == intent_id)
            .cloned()
            .collect()
    }

    /// Entries kept in memory whose file mirror write failed
    pub fn mirror_failures(&self) -> u64 {
        self.mirror_failures.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionStatus, PortfolioDelta, Stage};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(intent_id: Uuid, status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            intent_id,
            venue: "V1".into(),
            status,
            tx_id: None,
            latency_ms: 3,
            slippage_bps: None,
            failed_stage: (status == ExecutionStatus::Errored).then_some(Stage::Signing),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn entries_get_increasing_sequence_numbers() {
        let journal = ExecutionJournal::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(journal.append_execution(record(a, ExecutionStatus::Executed)).await, 1);
        assert_eq!(journal.append_execution(record(b, ExecutionStatus::Errored)).await, 2);
        let seq = journal
            .append_reconciliation(ReconciliationRecord {
                intent_id: b,
                tx_id: "tx9".into(),
                delta: PortfolioDelta::new().with_change("A".into(), dec!(-1)),
                reason: "ledger rejected delta".into(),
                broadcast_confirmed: true,
                recorded_at: Utc::now(),
            })
            .await;
        assert_eq!(seq, 3);

        assert_eq!(journal.executions().await.len(), 2);
        assert_eq!(journal.reconciliations().await.len(), 1);
        assert_eq!(journal.entries_for(b).await.len(), 2);
    }

    #[tokio::test]
    async fn mirrors_entries_as_json_lines() {
        let path = std::env::temp_dir().join(format!("tradegate-journal-{}.jsonl", Uuid::new_v4()));
        let journal = ExecutionJournal::with_file(&path);
        let id = Uuid::new_v4();

        journal.append_execution(record(id, ExecutionStatus::Rejected)).await;
        journal.append_execution(record(id, ExecutionStatus::Executed)).await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<StoredEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].seq, 2);
        assert!(content.contains("\"type\":\"execution\""));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_reach_the_file_in_sequence_order() {
        let path = std::env::temp_dir().join(format!("tradegate-journal-{}.jsonl", Uuid::new_v4()));
        let journal = std::sync::Arc::new(ExecutionJournal::with_file(&path));

        let tasks: Vec<_> = (0..24)
            .map(|_| {
                let journal = journal.clone();
                tokio::spawn(async move {
                    journal
                        .append_execution(record(Uuid::new_v4(), ExecutionStatus::Executed))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let seqs: Vec<u64> = content
            .lines()
            .map(|l| serde_json::from_str::<StoredEntry>(l).unwrap().seq)
            .collect();
        assert_eq!(seqs, (1..=24).collect::<Vec<u64>>());
        assert_eq!(journal.mirror_failures(), 0);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unwritable_mirror_is_counted_and_memory_keeps_the_entry() {
        // A directory cannot be opened for appending
        let journal = ExecutionJournal::with_file(std::env::temp_dir());
        let id = Uuid::new_v4();

        assert_eq!(journal.append_execution(record(id, ExecutionStatus::Executed)).await, 1);
        assert_eq!(journal.append_execution(record(id, ExecutionStatus::Rejected)).await, 2);

        assert_eq!(journal.mirror_failures(), 2);
        assert_eq!(journal.entries_for(id).await.len(), 2);
    }
}
