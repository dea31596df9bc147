//! Split dispatcher: range-bruteforce fan-out for `mii-lfcs` jobs
//! (§4.6). Operates directly on the `SplitProgress` embedded in a
//! `Job::MiiLfcs`; the `Coordinator` holds the lock and the registry,
//! this module holds the scheduling and sub-job bookkeeping logic.

use chrono::{DateTime, Utc};
use coordinator_model::job::{ConsoleModel, InFlightOffset, Job, JobState, SplitProgress};

/// A dispatched unit of work for a worker to compute.
#[derive(Debug, Clone)]
pub(crate) struct SubJob {
    pub parent_key: String,
    pub subkey: String,
    pub system_id: String,
    pub model: ConsoleModel,
    pub year: Option<u32>,
    pub index: u32,
}

/// The only anchor the spec gives: old-model consoles manufactured in
/// 2015 center the search at `0x09800000 >> 16`. No other (model,
/// year) anchor is specified, so anything else falls back to the
/// midpoint of the model's range.
fn start_index(model: ConsoleModel, year: Option<u32>, count: u32) -> u32 {
    if model == ConsoleModel::Old && year == Some(2015) {
        return (0x0980_0000u32 >> 16).min(count.saturating_sub(1));
    }
    count / 2
}

/// Builds the progress state for a freshly submitted `mii-lfcs` job.
pub(crate) fn new_progress(model: ConsoleModel, year: Option<u32>) -> SplitProgress {
    let count = model.max_shifted();
    let istart = start_index(model, year, count);
    SplitProgress::new(count, istart)
}

/// The deterministic zig-zag scan: `0, +1, -1, +2, -2, ...` centred on
/// `istart`, bounded to `[0, count)`, skipping indices already issued
/// or done. Returns `None` (not a sentinel index) once the full range
/// has been scanned with nothing left to offer.
fn next_offset(split: &mut SplitProgress) -> Option<u32> {
    if split.count == 0 {
        return None;
    }
    for d in 0..split.count {
        for sign in [1i64, -1i64] {
            if d == 0 && sign < 0 {
                continue;
            }
            let candidate = split.istart as i64 + sign * d as i64;
            if candidate < 0 || candidate as u32 >= split.count {
                continue;
            }
            let idx = candidate as u32;
            if split.is_set(idx) {
                continue;
            }
            split.set(idx);
            return Some(idx);
        }
    }
    None
}

fn subkey_for(idx: u32) -> String {
    format!("{:04x}", idx as u16)
}

/// Attempts to produce the next sub-job for `job` (which must be a
/// `Job::MiiLfcs`). Returns `None` if the offset space is exhausted.
pub(crate) fn dispatch(job: &mut Job) -> Option<SubJob> {
    let Job::MiiLfcs {
        header,
        system_id,
        model,
        year,
        split,
    } = job
    else {
        return None;
    };
    let idx = next_offset(split)?;
    let subkey = subkey_for(idx);
    split.in_flight.insert(
        subkey.clone(),
        InFlightOffset { index: idx, assignee: None },
    );
    Some(SubJob {
        parent_key: header.key.clone(),
        subkey,
        system_id: system_id.clone(),
        model: *model,
        year: *year,
        index: idx,
    })
}

/// Records the assignee for an already-dispatched sub-job and moves
/// the parent to `working` if it was `waiting`.
pub(crate) fn assign(job: &mut Job, subkey: &str, worker: &str, now: DateTime<Utc>) {
    let Job::MiiLfcs { header, split, .. } = job else { return };
    if let Some(entry) = split.in_flight.get_mut(subkey) {
        entry.assignee = Some(worker.to_string());
    }
    header.last_update = now;
    if header.state == JobState::Waiting {
        header.state = JobState::Working;
        header.assignee = Some(worker.to_string());
    }
}

/// Clears the progress bit and in-flight entry for `subkey`, allowing
/// it to be reissued. Used by both explicit release and (per the
/// `fail_releases_subjob` policy) sub-job failure.
pub(crate) fn release(job: &mut Job, subkey: &str) {
    let Job::MiiLfcs { split, .. } = job else { return };
    if let Some(entry) = split.in_flight.remove(subkey) {
        split.clear(entry.index);
    }
}

/// A sub-job completed without a hit: the offset is definitively
/// checked (its bit stays set) but no longer in flight.
pub(crate) fn complete_empty(job: &mut Job, subkey: &str) {
    let Job::MiiLfcs { split, .. } = job else { return };
    split.in_flight.remove(subkey);
}

/// Clears every in-flight offset and its progress bit. Used when a
/// whole `mii-lfcs` parent is swept for inactivity: unlike a targeted
/// `release`, the timed-out worker could have been holding any number
/// of its offsets, so all of them go back up for reissue.
pub(crate) fn release_all(job: &mut Job) {
    let Job::MiiLfcs { split, .. } = job else { return };
    for (_, entry) in std::mem::take(&mut split.in_flight) {
        split.clear(entry.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordinator_model::job::JobHeader;

    fn new_job(system_id: &str, model: ConsoleModel, year: Option<u32>) -> Job {
        let now = Utc::now();
        Job::MiiLfcs {
            header: JobHeader::new(system_id.to_string(), JobState::Waiting, now),
            system_id: system_id.to_string(),
            model,
            year,
            split: new_progress(model, year),
        }
    }

    #[test]
    fn zig_zag_order_and_distinct_subkeys() {
        let mut job = new_job("deadbeefcafebabe", ConsoleModel::New, Some(2016));
        let Job::MiiLfcs { split, .. } = &job else { unreachable!() };
        let istart = split.istart;

        let mut seen = std::collections::BTreeSet::new();
        let mut indices = Vec::new();
        for _ in 0..10 {
            let sub = dispatch(&mut job).expect("offset space is large enough for 10 draws");
            assert!(seen.insert(sub.subkey.clone()), "subkey issued twice");
            indices.push(sub.index as i64 - istart as i64);
        }
        assert_eq!(indices, vec![0, 1, -1, 2, -2, 3, -3, 4, -4, 5]);

        let Job::MiiLfcs { split, .. } = &job else { unreachable!() };
        assert_eq!(split.popcount(), 10);
        assert_eq!(split.in_flight.len(), 10);
    }

    #[test]
    fn release_allows_reissue() {
        let mut job = new_job("deadbeefcafebabe", ConsoleModel::New, Some(2016));
        let sub = dispatch(&mut job).unwrap();
        release(&mut job, &sub.subkey);
        let Job::MiiLfcs { split, .. } = &job else { unreachable!() };
        assert_eq!(split.popcount(), 0);
        assert!(split.in_flight.is_empty());
    }

    #[test]
    fn complete_empty_keeps_bit_set_but_drops_in_flight() {
        let mut job = new_job("deadbeefcafebabe", ConsoleModel::New, Some(2016));
        let sub = dispatch(&mut job).unwrap();
        complete_empty(&mut job, &sub.subkey);
        let Job::MiiLfcs { split, .. } = &job else { unreachable!() };
        assert_eq!(split.popcount(), 1);
        assert!(split.in_flight.is_empty());
    }
}
