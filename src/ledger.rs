use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KvStore, SyncError};

/// Store key holding the serialized array of progress records.
pub const LEDGER_KEY: &str = "chapter_progress";

/// Build the composite unit id `"{class}:{subject}:{chapter}"`.
pub fn unit_id(class_id: &str, subject_id: &str, chapter_id: &str) -> String {
    format!("{class_id}:{subject_id}:{chapter_id}")
}

/// Chapter part of a unit id: everything after the second `:` of a composite
/// id, or the whole id when it is a bare chapter id.
pub fn chapter_id_of(unit_id: &str) -> &str {
    let mut parts = unit_id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(chapter)) if !chapter.is_empty() => chapter,
        _ => unit_id,
    }
}

/// Local completion state of one content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUnitProgress {
    pub unit_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

impl ContentUnitProgress {
    /// Identifier the remote service knows this unit by.
    pub fn chapter_id(&self) -> &str {
        chapter_id_of(&self.unit_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressAggregate {
    pub completed_count: usize,
    pub percent_complete: u32,
}

/// Authoritative local record of which units a learner has completed.
///
/// Records move `accessed -> completed` and never back; nothing is deleted
/// except by `reset`.
#[derive(Clone, Copy)]
pub struct ProgressLedger<'s> {
    store: &'s KvStore,
}

impl<'s> ProgressLedger<'s> {
    pub fn new(store: &'s KvStore) -> Self {
        Self { store }
    }

    pub fn all(&self) -> Result<Vec<ContentUnitProgress>, SyncError> {
        Ok(self.store.get(LEDGER_KEY)?.unwrap_or_default())
    }

    pub fn get(&self, unit_id: &str) -> Result<Option<ContentUnitProgress>, SyncError> {
        Ok(self.all()?.into_iter().find(|r| r.unit_id == unit_id))
    }

    /// Insert or update the record for `unit_id` and persist it before returning.
    pub fn upsert(
        &self,
        unit_id: &str,
        subject_id: &str,
        class_id: &str,
        completed: bool,
    ) -> Result<ContentUnitProgress, SyncError> {
        self.upsert_at(unit_id, subject_id, class_id, completed, Utc::now())
    }

    /// `upsert` with an explicit clock reading.
    pub fn upsert_at(
        &self,
        unit_id: &str,
        subject_id: &str,
        class_id: &str,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<ContentUnitProgress, SyncError> {
        let mut records = self.all()?;
        let record = match records.iter_mut().find(|r| r.unit_id == unit_id) {
            Some(existing) => {
                // a clock step backwards must not reorder access and completion
                existing.last_accessed_at = existing.last_accessed_at.max(now);
                existing.subject_id = subject_id.to_string();
                existing.class_id = class_id.to_string();
                if completed && !existing.completed {
                    existing.completed = true;
                    existing.completed_at = Some(existing.last_accessed_at);
                }
                existing.clone()
            }
            None => {
                let record = ContentUnitProgress {
                    unit_id: unit_id.to_string(),
                    subject_id: subject_id.to_string(),
                    class_id: class_id.to_string(),
                    completed,
                    completed_at: completed.then_some(now),
                    last_accessed_at: now,
                };
                records.push(record.clone());
                record
            }
        };
        self.store.put(LEDGER_KEY, &records)?;
        tracing::debug!(
            unit_id,
            completed = record.completed,
            "progress record stored"
        );
        Ok(record)
    }

    /// Note that a unit was opened without completing it.
    pub fn record_access(
        &self,
        unit_id: &str,
        subject_id: &str,
        class_id: &str,
    ) -> Result<ContentUnitProgress, SyncError> {
        self.upsert(unit_id, subject_id, class_id, false)
    }

    pub fn for_scope(
        &self,
        subject_id: &str,
        class_id: &str,
    ) -> Result<Vec<ContentUnitProgress>, SyncError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.subject_id == subject_id && r.class_id == class_id)
            .collect())
    }

    /// Completion count and rounded percentage against a caller-supplied total.
    pub fn aggregate(
        &self,
        subject_id: &str,
        class_id: &str,
        total_units: usize,
    ) -> Result<ProgressAggregate, SyncError> {
        let completed_count = self
            .for_scope(subject_id, class_id)?
            .iter()
            .filter(|r| r.completed)
            .count();
        let percent_complete = if total_units == 0 {
            0
        } else {
            let pct = (completed_count * 100 + total_units / 2) / total_units;
            pct.min(100) as u32
        };
        Ok(ProgressAggregate {
            completed_count,
            percent_complete,
        })
    }

    /// Explicit full reset; the only path that deletes records.
    pub fn reset(&self) -> Result<(), SyncError> {
        self.store.remove(LEDGER_KEY)?;
        tracing::info!("progress ledger reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_access_creates_incomplete_record() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);

        let rec = ledger.upsert_at("u1", "math", "c6", false, at(0)).unwrap();
        assert!(!rec.completed);
        assert!(rec.completed_at.is_none());
        assert_eq!(ledger.get("u1").unwrap(), Some(rec));
    }

    #[test]
    fn completion_sets_completed_at_not_before_last_access() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);

        ledger.upsert_at("u1", "math", "c6", false, at(10)).unwrap();
        // clock went backwards between access and completion
        let rec = ledger.upsert_at("u1", "math", "c6", true, at(5)).unwrap();
        assert!(rec.completed);
        assert_eq!(rec.completed_at, Some(at(10)));
        assert!(rec.completed_at.unwrap() >= rec.last_accessed_at);
    }

    #[test]
    fn repeated_completion_keeps_first_timestamp_and_single_record() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);

        ledger.upsert_at("u1", "math", "c6", true, at(0)).unwrap();
        let second = ledger.upsert_at("u1", "math", "c6", true, at(60)).unwrap();

        assert_eq!(second.completed_at, Some(at(0)));
        assert_eq!(second.last_accessed_at, at(60));
        assert_eq!(ledger.all().unwrap().len(), 1);
    }

    #[test]
    fn access_after_completion_never_clears_it() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);

        ledger.upsert_at("u1", "math", "c6", true, at(0)).unwrap();
        let rec = ledger.upsert_at("u1", "math", "c6", false, at(30)).unwrap();
        assert!(rec.completed);
        assert_eq!(rec.completed_at, Some(at(0)));
        assert_eq!(rec.last_accessed_at, at(30));
    }

    #[test]
    fn aggregate_counts_only_matching_scope() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);

        ledger.upsert("u1", "math", "c6", true).unwrap();
        ledger.upsert("u2", "math", "c6", true).unwrap();
        ledger.upsert("u3", "math", "c6", false).unwrap();
        ledger.upsert("u4", "science", "c6", true).unwrap();
        ledger.upsert("u5", "math", "c7", true).unwrap();

        let agg = ledger.aggregate("math", "c6", 5).unwrap();
        assert_eq!(agg.completed_count, 2);
        assert_eq!(agg.percent_complete, 40);
    }

    #[test]
    fn aggregate_handles_zero_and_rounding() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);
        ledger.upsert("u1", "math", "c6", true).unwrap();

        assert_eq!(ledger.aggregate("math", "c6", 0).unwrap().percent_complete, 0);
        assert_eq!(ledger.aggregate("math", "c6", 3).unwrap().percent_complete, 33);
        // caller total smaller than what the ledger knows about
        ledger.upsert("u2", "math", "c6", true).unwrap();
        assert_eq!(ledger.aggregate("math", "c6", 1).unwrap().percent_complete, 100);
    }

    #[test]
    fn reset_removes_everything() {
        let store = KvStore::open_in_memory().unwrap();
        let ledger = ProgressLedger::new(&store);
        ledger.upsert("u1", "math", "c6", true).unwrap();

        ledger.reset().unwrap();
        assert!(ledger.all().unwrap().is_empty());
        assert!(ledger.get("u1").unwrap().is_none());
    }

    #[test]
    fn unit_id_is_composite() {
        assert_eq!(unit_id("c6", "math", "fractions"), "c6:math:fractions");
    }

    #[test]
    fn chapter_id_comes_from_the_last_part() {
        let id = unit_id("class-6", "class-6/mathematics", "class-6/mathematics/fractions");
        assert_eq!(chapter_id_of(&id), "class-6/mathematics/fractions");
        assert_eq!(chapter_id_of("64b7f0c2a1d3e4f5a6b7c902"), "64b7f0c2a1d3e4f5a6b7c902");
        assert_eq!(chapter_id_of("a:b"), "a:b");
        assert_eq!(chapter_id_of("a:b:c:d"), "c:d");
    }
}
