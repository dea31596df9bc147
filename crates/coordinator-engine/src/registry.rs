//! Job registry (key -> job), the wait queue (ordered keys eligible
//! for dispatch), and the worker registry (name -> last-seen record).
//! All three are plain in-memory collections; synchronization lives
//! one layer up, in the `Coordinator`.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use coordinator_model::job::{Job, JobKind, JobState};
use coordinator_model::worker::{Worker, WorkerKind};

#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
    jobs: HashMap<String, Job>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        JobRegistry { jobs: HashMap::new() }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Job> {
        self.jobs.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Job> {
        self.jobs.get_mut(key)
    }

    pub(crate) fn insert(&mut self, job: Job) {
        self.jobs.insert(job.key().to_string(), job);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Job> {
        self.jobs.remove(key)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub(crate) fn list(&self, status_filter: Option<JobState>) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| status_filter.is_none_or(|s| j.state() == s))
            .collect()
    }

    pub(crate) fn count(&self, status_filter: Option<JobState>) -> usize {
        self.list(status_filter).len()
    }

    pub(crate) fn keys_in_state(&self, state: JobState) -> Vec<String> {
        self.jobs
            .values()
            .filter(|j| j.state() == state)
            .map(|j| j.key().to_string())
            .collect()
    }

    /// Every job in `need_prereq` state whose declared prereq is `prereq_key`.
    pub(crate) fn dependents_of(&self, prereq_key: &str) -> Vec<String> {
        self.jobs
            .values()
            .filter_map(|j| match j {
                Job::Msed {
                    header,
                    prereq_key: Some(p),
                    ..
                } if header.state == JobState::NeedPrereq && p == prereq_key => {
                    Some(header.key.clone())
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    queue: VecDeque<String>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        WaitQueue { queue: VecDeque::new() }
    }

    pub(crate) fn push_back(&mut self, key: String) {
        self.queue.push_back(key);
    }

    /// Urgent requeue: released `working` jobs and split parents
    /// awaiting further sub-issuance go to the head of the queue.
    pub(crate) fn push_front(&mut self, key: String) {
        self.queue.push_front(key);
    }

    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(pos) = self.queue.iter().position(|k| k == key) {
            self.queue.remove(pos);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    /// Scans from the front and removes the first entry whose kind is
    /// accepted. `None` accepted set means "accept anything".
    pub(crate) fn pop_accepted(
        &mut self,
        jobs: &JobRegistry,
        accepted_kinds: Option<&std::collections::BTreeSet<JobKind>>,
    ) -> Option<String> {
        let pos = self.queue.iter().position(|key| {
            let Some(job) = jobs.get(key) else { return false };
            accepted_kinds.is_none_or(|accepted| accepted.contains(&job.kind()))
        })?;
        self.queue.remove(pos)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WorkerRegistry {
    workers: HashMap<String, Worker>,
}

impl WorkerRegistry {
    pub(crate) fn new() -> Self {
        WorkerRegistry { workers: HashMap::new() }
    }

    /// Upserts `name`'s record, creating it if this is the first time
    /// the worker has been seen.
    pub(crate) fn touch(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
        kind: Option<WorkerKind>,
        ip: Option<String>,
        version: Option<String>,
    ) {
        self.workers
            .entry(name.to_string())
            .or_insert_with(|| Worker::new(name.to_string(), now))
            .touch(now, kind, ip, version);
    }

    pub(crate) fn list(&self, kind_filter: Option<WorkerKind>) -> Vec<&Worker> {
        self.workers
            .values()
            .filter(|w| kind_filter.is_none_or(|k| w.kind == Some(k)))
            .collect()
    }
}
