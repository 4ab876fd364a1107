//! Authoritative mapping from job id to job record.
//!
//! The registry is plain synchronous data; the scheduler owns it behind
//! its state lock. Updates for unknown ids are no-ops because a network
//! callback may return after its job was cleared.

use std::collections::HashMap;

use genjobs_core::job::{JobMetadata, JobRecord, JobUpdate};
use genjobs_core::provider::Provider;
use genjobs_core::types::JobId;

struct Entry {
    record: JobRecord,
    /// Polls performed so far.
    tick_count: u32,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, Entry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `Queued` record, replacing any previous record with
    /// the same id, and return a snapshot of it.
    pub fn create(&mut self, provider: Provider, handle: &str, metadata: JobMetadata) -> JobRecord {
        let record = JobRecord::new(provider, handle, metadata);
        self.jobs.insert(
            record.id.clone(),
            Entry {
                record: record.clone(),
                tick_count: 0,
            },
        );
        record
    }

    pub fn get(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(id).map(|e| &e.record)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Apply a partial update. Returns `true` if the record changed.
    ///
    /// Unknown ids and illegal transitions are ignored.
    pub fn update(&mut self, id: &JobId, update: JobUpdate) -> bool {
        let Some(entry) = self.jobs.get_mut(id) else {
            tracing::debug!(job_id = %id, "Ignoring update for unknown job");
            return false;
        };
        match entry.record.apply(update) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "Ignoring rejected job update");
                false
            }
        }
    }

    pub fn remove(&mut self, id: &JobId) -> Option<JobRecord> {
        self.jobs.remove(id).map(|e| e.record)
    }

    /// Count one more poll for `id` and return the new total.
    pub fn record_tick(&mut self, id: &JobId) -> Option<u32> {
        self.jobs.get_mut(id).map(|e| {
            e.tick_count += 1;
            e.tick_count
        })
    }

    pub fn tick_count(&self, id: &JobId) -> Option<u32> {
        self.jobs.get(id).map(|e| e.tick_count)
    }

    /// Jobs still `Queued` or `Processing`, oldest first.
    pub fn list_active(&self) -> Vec<JobRecord> {
        self.collect(|r| r.status.is_active())
    }

    /// Jobs that reached `Completed` or `Failed`, oldest first.
    pub fn list_completed(&self) -> Vec<JobRecord> {
        self.collect(|r| r.status.is_terminal())
    }

    pub fn any_active(&self) -> bool {
        self.jobs.values().any(|e| e.record.status.is_active())
    }

    /// Number of records held, active or not.
    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    fn collect(&self, keep: impl Fn(&JobRecord) -> bool) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .values()
            .map(|e| &e.record)
            .filter(|r| keep(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[cfg(test)]
mod tests {
    use genjobs_core::job::JobStatus;

    use super::*;

    fn meta() -> JobMetadata {
        JobMetadata::new("city at night", "veo-3.0")
    }

    #[test]
    fn create_and_get() {
        let mut reg = JobRegistry::new();
        let record = reg.create(Provider::Veo, "op1", meta());
        assert_eq!(reg.get(&record.id), Some(&record));
        assert_eq!(reg.tick_count(&record.id), Some(0));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let mut reg = JobRegistry::new();
        assert!(!reg.update(&JobId::from("veo:gone"), JobUpdate::processing(Some(5))));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn update_rejects_backward_transition() {
        let mut reg = JobRegistry::new();
        let id = reg.create(Provider::Sora, "v1", meta()).id;
        assert!(reg.update(&id, JobUpdate::failed("boom")));
        assert!(!reg.update(&id, JobUpdate::processing(Some(50))));
        assert_eq!(reg.get(&id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn record_tick_increments() {
        let mut reg = JobRegistry::new();
        let id = reg.create(Provider::Veo, "op1", meta()).id;
        assert_eq!(reg.record_tick(&id), Some(1));
        assert_eq!(reg.record_tick(&id), Some(2));
        assert_eq!(reg.tick_count(&id), Some(2));
        assert_eq!(reg.record_tick(&JobId::from("veo:other")), None);
    }

    #[test]
    fn active_and_completed_views() {
        let mut reg = JobRegistry::new();
        let a = reg.create(Provider::Veo, "a", meta()).id;
        let b = reg.create(Provider::Veo, "b", meta()).id;
        let c = reg.create(Provider::Sora, "c", meta()).id;
        reg.update(&b, JobUpdate::processing(Some(30)));
        reg.update(&c, JobUpdate::completed("https://cdn/c.mp4"));

        let active: Vec<JobId> = reg.list_active().into_iter().map(|r| r.id).collect();
        let completed: Vec<JobId> = reg.list_completed().into_iter().map(|r| r.id).collect();
        assert_eq!(active.len(), 2);
        assert!(active.contains(&a) && active.contains(&b));
        assert_eq!(completed, vec![c]);
        assert!(reg.any_active());
    }

    #[test]
    fn remove_drops_record_and_ticks() {
        let mut reg = JobRegistry::new();
        let id = reg.create(Provider::Veo, "op1", meta()).id;
        reg.record_tick(&id);
        assert!(reg.remove(&id).is_some());
        assert!(reg.get(&id).is_none());
        assert!(reg.tick_count(&id).is_none());
        assert!(!reg.any_active());
    }
}
