//! In-memory job registry.
//!
//! The registry exclusively owns every [`Job`] record. Readers get cloned
//! snapshots; writers go through [`JobRegistry::update`], which runs the
//! mutation under the record's shard lock so a poller never observes a
//! half-applied change.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use vc_core::{ConversionId, Error, Job, JobState, Result};

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

/// Thread-safe map of conversion id to job record.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<ConversionId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, build the record for it and register it.
    ///
    /// `build` runs without any registry lock held; if it fails nothing is
    /// registered.
    pub fn create(&self, build: impl FnOnce(ConversionId) -> Result<Job>) -> Result<ConversionId> {
        let id = ConversionId::new();
        let job = build(id)?;
        if job.id != id {
            return Err(Error::Internal(format!(
                "job built for {id} carries id {}",
                job.id
            )));
        }
        match self.jobs.entry(id) {
            Entry::Occupied(_) => Err(Error::Conflict(format!("conversion {id} already exists"))),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(id)
            }
        }
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &ConversionId) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|job| job.value().clone())
            .ok_or_else(|| Error::not_found("conversion", id))
    }

    /// Apply `mutate` to a job atomically with respect to readers.
    ///
    /// `mutate` must not block or await.
    pub fn update<R>(&self, id: &ConversionId, mutate: impl FnOnce(&mut Job) -> R) -> Result<R> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("conversion", id))?;
        Ok(mutate(job.value_mut()))
    }

    /// Drop a job record, returning it.
    pub fn remove(&self, id: &ConversionId) -> Option<Job> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for job in self.jobs.iter() {
            match job.state {
                JobState::Pending => counts.pending += 1,
                JobState::Processing => counts.processing += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Ids of terminal jobs that finished before `cutoff`.
    pub fn finished_before(&self, cutoff: DateTime<Utc>) -> Vec<ConversionId> {
        self.jobs
            .iter()
            .filter(|job| job.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff))
            .map(|job| job.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use vc_core::{EncodingPlan, PresetName};

    use super::*;

    fn build(id: ConversionId) -> Result<Job> {
        Ok(Job::new(
            id,
            EncodingPlan::for_preset(PresetName::WebStandard).unwrap(),
            "clip.mp4",
            PathBuf::from(format!("uploads/{id}_clip.mp4")),
            PathBuf::from(format!("outputs/{id}_clip.webm")),
        ))
    }

    #[test]
    fn create_allocates_fresh_ids() {
        let registry = JobRegistry::new();
        let a = registry.create(build).unwrap();
        let b = registry.create(build).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&a).unwrap().state, JobState::Pending);
    }

    #[test]
    fn failed_build_registers_nothing() {
        let registry = JobRegistry::new();
        let result = registry.create(|_| Err(Error::Internal("disk full".into())));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        let id = ConversionId::new();
        assert!(matches!(registry.get(&id), Err(Error::NotFound { .. })));
        assert!(matches!(
            registry.update(&id, |j| j.progress = 50.0),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn update_returns_closure_result() {
        let registry = JobRegistry::new();
        let id = registry.create(build).unwrap();
        registry.update(&id, |j| j.start()).unwrap().unwrap();
        let applied = registry
            .update(&id, |j| j.apply_progress(42.0, None))
            .unwrap();
        assert!(applied);
        assert_eq!(registry.get(&id).unwrap().progress, 42.0);
    }

    #[test]
    fn concurrent_updates_stay_monotonic() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create(build).unwrap();
        registry.update(&id, |j| j.start()).unwrap().unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let pct = ((i * 4 + w) % 101) as f64;
                        registry.update(&id, |j| j.apply_progress(pct, None)).unwrap();
                    }
                })
            })
            .collect();

        let mut last = 0.0;
        for _ in 0..500 {
            let seen = registry.get(&id).unwrap().progress;
            assert!(seen >= last, "progress went backwards: {last} -> {seen}");
            last = seen;
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(registry.get(&id).unwrap().progress, 100.0);
    }

    #[test]
    fn counts_and_expiry() {
        let registry = JobRegistry::new();
        let pending = registry.create(build).unwrap();
        let done = registry.create(build).unwrap();
        registry
            .update(&done, |j| {
                j.start()?;
                j.complete(100, 10, "ffmpeg-vp9")
            })
            .unwrap()
            .unwrap();

        let counts = registry.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);

        let future = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(registry.finished_before(future), vec![done]);
        assert!(registry.finished_before(Utc::now() - chrono::Duration::hours(1)).is_empty());

        assert!(registry.remove(&pending).is_some());
        assert!(registry.remove(&pending).is_none());
    }
}
