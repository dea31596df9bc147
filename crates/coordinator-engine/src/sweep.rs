//! Liveness sweeps (§4.8, §4.11): releasing `working` jobs whose
//! assignee has gone quiet, and trimming `canceled` jobs nobody has
//! acted on. Both collect offending keys first, then mutate — so a
//! state change discovered mid-scan by a later key in the same pass
//! never feeds back into the scan itself.

use chrono::{DateTime, Utc};

use coordinator_model::job::JobState;

use crate::registry::{JobRegistry, WaitQueue};
use crate::split;
use crate::state_machine;

/// Releases every `working` job idle longer than `timeout`, returning
/// the keys released. A released `mii-lfcs` job also loses its
/// in-flight sub-job bookkeeping for every offset it had outstanding —
/// the dead worker could have been holding any of them — and is
/// requeued at the front so it gets picked back up promptly.
pub(crate) fn release_dead_jobs(
    jobs: &mut JobRegistry,
    queue: &mut WaitQueue,
    timeout: chrono::Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    let stale: Vec<String> = jobs
        .keys_in_state(JobState::Working)
        .into_iter()
        .filter(|k| jobs.get(k).is_some_and(|j| j.header().has_timed_out(now, timeout)))
        .collect();

    for key in &stale {
        let Some(job) = jobs.get_mut(key) else { continue };
        if state_machine::release(job, now).is_ok() {
            split::release_all(job);
            queue.push_front(key.clone());
        }
    }
    stale
}

/// Deletes every `canceled` job that has sat untouched longer than
/// `timeout`, returning the keys removed.
pub(crate) fn trim_canceled_jobs(
    jobs: &mut JobRegistry,
    queue: &mut WaitQueue,
    timeout: chrono::Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    let stale: Vec<String> = jobs
        .keys_in_state(JobState::Canceled)
        .into_iter()
        .filter(|k| jobs.get(k).is_some_and(|j| j.header().has_timed_out(now, timeout)))
        .collect();

    for key in &stale {
        queue.remove(key);
        jobs.remove(key);
    }
    stale
}
