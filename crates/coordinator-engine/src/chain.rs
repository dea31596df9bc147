//! Chain resolver (§4.7): atomic submission of dependent job chains,
//! artifact short-circuiting, and prerequisite fulfilment.

use chrono::{DateTime, Utc};

use coordinator_model::error::CoordinatorError;
use coordinator_model::job::{ConsoleModel, Job, JobHeader, JobKind, JobState};
use coordinator_model::validators;

use crate::registry::{JobRegistry, WaitQueue};
use crate::split;
use crate::state_machine;
use crate::store::ArtifactStore;

/// One entry of a submitted chain, before it is validated and turned
/// into a `Job`.
#[derive(Debug, Clone)]
pub enum JobSubmission {
    FcLfcs {
        friend_code: String,
    },
    MiiLfcs {
        system_id: String,
        model: String,
        year: Option<u32>,
    },
    Msed {
        id0: String,
        /// Supplied directly rather than via a chained prerequisite.
        lfcs: Option<Vec<u8>>,
    },
}

impl JobSubmission {
    fn key(&self) -> &str {
        match self {
            JobSubmission::FcLfcs { friend_code } => friend_code,
            JobSubmission::MiiLfcs { system_id, .. } => system_id,
            JobSubmission::Msed { id0, .. } => id0,
        }
    }

    fn kind(&self) -> JobKind {
        match self {
            JobSubmission::FcLfcs { .. } => JobKind::FcLfcs,
            JobSubmission::MiiLfcs { .. } => JobKind::MiiLfcs,
            JobSubmission::Msed { .. } => JobKind::Msed,
        }
    }

    fn validate(&self) -> Result<(), CoordinatorError> {
        match self {
            JobSubmission::FcLfcs { friend_code } => {
                if !validators::is_friend_code(friend_code) {
                    return Err(CoordinatorError::invalid_fields(&["friend_code"]));
                }
                if coordinator_model::blacklist::is_blacklisted(friend_code) {
                    return Err(CoordinatorError::InvalidInput(
                        "blacklisted friend code".into(),
                    ));
                }
                Ok(())
            }
            JobSubmission::MiiLfcs { system_id, model, .. } => {
                let mut invalid = Vec::new();
                if !validators::is_system_id(system_id) {
                    invalid.push("system_id");
                }
                if ConsoleModel::from_str(model).is_none() {
                    invalid.push("model");
                }
                if invalid.is_empty() {
                    Ok(())
                } else {
                    Err(CoordinatorError::invalid_fields(&invalid))
                }
            }
            JobSubmission::Msed { id0, .. } => {
                if validators::is_id0(id0) {
                    Ok(())
                } else {
                    Err(CoordinatorError::invalid_fields(&["id0"]))
                }
            }
        }
    }

    /// Builds the registry `Job`, wiring `prereq_key` onto a `msed`
    /// entry that doesn't already carry its lfcs directly.
    fn build(self, prereq_key: Option<String>, now: DateTime<Utc>) -> Job {
        let key = self.key().to_string();
        match self {
            JobSubmission::FcLfcs { friend_code } => Job::FcLfcs {
                header: JobHeader::new(key, JobState::Submitted, now),
                friend_code,
            },
            JobSubmission::MiiLfcs { system_id, model, year } => {
                let model = ConsoleModel::from_str(&model).expect("validated");
                Job::MiiLfcs {
                    header: JobHeader::new(key, JobState::Submitted, now),
                    system_id,
                    model,
                    year,
                    split: split::new_progress(model, year),
                }
            }
            JobSubmission::Msed { id0, lfcs } => {
                let prereq_key = if lfcs.is_some() { None } else { prereq_key };
                Job::Msed {
                    header: JobHeader::new(key, JobState::Submitted, now),
                    id0,
                    lfcs,
                    prereq_key,
                }
            }
        }
    }
}

/// Submits a chain atomically (§4.7 steps 1-5). Returns the keys that
/// were actually registered — empty if the terminal job was already
/// done and the whole chain was silently discarded.
pub(crate) fn submit_chain(
    jobs: &mut JobRegistry,
    queue: &mut WaitQueue,
    store: &ArtifactStore,
    entries: Vec<JobSubmission>,
    overwrite_canceled: bool,
    now: DateTime<Utc>,
) -> Result<Vec<String>, CoordinatorError> {
    if entries.is_empty() {
        return Err(CoordinatorError::InvalidInput("empty chain".into()));
    }
    for entry in &entries {
        entry.validate()?;
    }

    let terminal = entries.last().unwrap();
    if store.exists(terminal.kind(), terminal.key()) {
        return Ok(Vec::new());
    }

    let keys: Vec<String> = entries.iter().map(|e| e.key().to_string()).collect();
    for key in &keys {
        if let Some(existing) = jobs.get(key) {
            let can_overwrite = overwrite_canceled && existing.state() == JobState::Canceled;
            if !can_overwrite {
                return Err(CoordinatorError::DuplicateJob(key.clone()));
            }
        }
    }
    for key in &keys {
        if jobs.contains(key) {
            jobs.remove(key);
        }
    }

    let mut prev_key: Option<String> = None;
    let mut built = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry.key().to_string();
        let mut job = entry.build(prev_key.clone(), now);
        state_machine::prepare(&mut job).expect("freshly built job is always `submitted`");
        built.push(job);
        prev_key = Some(key);
    }

    for job in built {
        let is_ready = job.state() == JobState::Ready;
        let key = job.key().to_string();
        jobs.insert(job);
        if is_ready {
            enqueue_ready(jobs, queue, &key);
        }
    }

    autocomplete(jobs, queue, store, &keys, now);

    Ok(keys)
}

fn enqueue_ready(jobs: &mut JobRegistry, queue: &mut WaitQueue, key: &str) {
    if let Some(job) = jobs.get_mut(key) {
        if state_machine::queue(job).is_ok() {
            queue.push_back(key.to_string());
        }
    }
}

/// For any chain member whose artifact already exists on disk, marks
/// it `done`, fulfils its dependents, and removes it.
fn autocomplete(
    jobs: &mut JobRegistry,
    queue: &mut WaitQueue,
    store: &ArtifactStore,
    keys: &[String],
    now: DateTime<Utc>,
) {
    for key in keys {
        let Some(job) = jobs.get(key) else { continue };
        if job.state() == JobState::Done {
            continue;
        }
        let kind = job.kind();
        if !store.exists(kind, key) {
            continue;
        }
        let Some(result) = store.read(kind, key) else { continue };
        if let Some(job) = jobs.get_mut(key) {
            let _ = force_done(job, now);
        }
        fulfil(jobs, queue, key, &result, now);
        jobs.remove(key);
    }
}

/// `complete` accepts a job from either `working` or `waiting` (the
/// latter covers artifact short-circuits encountered before a worker
/// ever picked the job up).
fn force_done(job: &mut Job, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    let header = job.header_mut();
    header.state = JobState::Done;
    header.last_update = now;
    Ok(())
}

/// Scans the registry for `need_prereq` jobs naming `prereq_key` as
/// their prerequisite, passes them the (already kind-appropriate)
/// result, and enqueues each. Returns the fulfilled dependents' keys.
pub(crate) fn fulfil(
    jobs: &mut JobRegistry,
    queue: &mut WaitQueue,
    prereq_key: &str,
    result: &[u8],
    now: DateTime<Utc>,
) -> Vec<String> {
    let dependents = jobs.dependents_of(prereq_key);
    for key in &dependents {
        if let Some(job) = jobs.get_mut(key) {
            if state_machine::pass_prereq(job, result.to_vec(), now).is_ok() {
                enqueue_ready(jobs, queue, key);
            }
        }
    }
    dependents
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_model::config::MirrorConfig;
    use coordinator_model::config::ArtifactRoots;

    fn store(dir: &std::path::Path) -> ArtifactStore {
        ArtifactStore::new(
            ArtifactRoots {
                fc_lfcs: dir.join("fc"),
                mii_lfcs: dir.join("mii"),
                msed: dir.join("msed"),
            },
            MirrorConfig { base: None, endpoint: None },
        )
    }

    #[test]
    fn chain_registers_both_members_and_queues_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut jobs = JobRegistry::new();
        let mut queue = WaitQueue::new();
        let id0 = "a".repeat(32);

        let entries = vec![
            JobSubmission::FcLfcs { friend_code: "128849018881".into() },
            JobSubmission::Msed { id0: id0.clone(), lfcs: None },
        ];
        let keys = submit_chain(&mut jobs, &mut queue, &store, entries, false, Utc::now()).unwrap();
        assert_eq!(keys, vec!["128849018881".to_string(), id0.clone()]);
        assert!(jobs.contains("128849018881"));
        assert!(jobs.contains(&id0));
        assert_eq!(queue.snapshot(), vec!["128849018881".to_string()]);
        assert_eq!(jobs.get(&id0).unwrap().state(), JobState::NeedPrereq);
    }

    #[test]
    fn duplicate_non_canceled_key_rejects_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut jobs = JobRegistry::new();
        let mut queue = WaitQueue::new();

        let first = vec![JobSubmission::FcLfcs { friend_code: "128849018881".into() }];
        submit_chain(&mut jobs, &mut queue, &store, first, false, Utc::now()).unwrap();

        let dup = vec![JobSubmission::FcLfcs { friend_code: "128849018881".into() }];
        let err = submit_chain(&mut jobs, &mut queue, &store, dup, false, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), coordinator_model::error::ErrorKind::DuplicateJob);
    }

    #[test]
    fn terminal_artifact_short_circuits_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let id0 = "b".repeat(32);
        store.save(JobKind::Msed, &id0, &[0xAB; 16]).unwrap();

        let mut jobs = JobRegistry::new();
        let mut queue = WaitQueue::new();
        let entries = vec![
            JobSubmission::FcLfcs { friend_code: "021474836482".into() },
            JobSubmission::Msed { id0: id0.clone(), lfcs: None },
        ];
        let keys = submit_chain(&mut jobs, &mut queue, &store, entries, false, Utc::now()).unwrap();
        assert!(keys.is_empty());
        assert!(!jobs.contains(&id0));
        assert!(!jobs.contains("021474836482"));
    }
}
