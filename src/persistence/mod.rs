//! Audit persistence: the append-only execution journal.

pub mod journal;

pub use journal::{ExecutionJournal, JournalEntry, StoredEntry};
