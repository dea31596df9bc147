//! The per-job transition table (§4.4), expressed as one function per
//! trigger rather than a generic `Machine` framework: each checks the
//! legal source state and panics-as-bug-never on anything else,
//! surfacing illegal calls as `CoordinatorError::Internal` instead.

use chrono::{DateTime, Utc};
use coordinator_model::error::CoordinatorError;
use coordinator_model::job::{Job, JobState};

fn illegal(trigger: &str, job: &Job) -> CoordinatorError {
    CoordinatorError::Internal(format!(
        "illegal transition `{trigger}` from state {:?} for job {}",
        job.state(),
        job.key()
    ))
}

/// `submitted -> ready` for jobs with no prerequisite, `submitted ->
/// need_prereq` for a chained `msed` whose prereq hasn't completed yet.
pub(crate) fn prepare(job: &mut Job) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Submitted {
        return Err(illegal("prepare", job));
    }
    let next = match job {
        Job::Msed {
            prereq_key: Some(_),
            lfcs: None,
            ..
        } => JobState::NeedPrereq,
        _ => JobState::Ready,
    };
    job.header_mut().state = next;
    Ok(())
}

/// `need_prereq -> ready`, populating the dependent's `lfcs` from the
/// prerequisite's (possibly truncated) result.
pub(crate) fn pass_prereq(job: &mut Job, lfcs: Vec<u8>, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    let Job::Msed {
        header,
        lfcs: slot,
        ..
    } = job
    else {
        return Err(illegal("pass_prereq", job));
    };
    if header.state != JobState::NeedPrereq {
        return Err(illegal("pass_prereq", job));
    }
    *slot = Some(lfcs);
    header.state = JobState::Ready;
    header.last_update = now;
    Ok(())
}

pub(crate) fn queue(job: &mut Job) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Ready {
        return Err(illegal("queue", job));
    }
    job.header_mut().state = JobState::Waiting;
    Ok(())
}

pub(crate) fn assign(job: &mut Job, worker: &str, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Waiting {
        return Err(illegal("assign", job));
    }
    let header = job.header_mut();
    header.state = JobState::Working;
    header.assignee = Some(worker.to_string());
    header.last_update = now;
    Ok(())
}

/// Releases a `working` job back to `waiting`, clearing its assignee.
/// Used both for explicit release and for timeout-driven release.
pub(crate) fn release(job: &mut Job, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Working {
        return Err(illegal("release", job));
    }
    let header = job.header_mut();
    header.state = JobState::Waiting;
    header.assignee = None;
    header.last_update = now;
    Ok(())
}

pub(crate) fn complete(job: &mut Job, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if !matches!(job.state(), JobState::Working | JobState::Waiting) {
        return Err(illegal("complete", job));
    }
    let header = job.header_mut();
    header.state = JobState::Done;
    header.last_update = now;
    Ok(())
}

pub(crate) fn fail(job: &mut Job, note: Option<String>, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Working {
        return Err(illegal("fail", job));
    }
    let header = job.header_mut();
    header.state = JobState::Failed;
    header.note = note;
    header.last_update = now;
    Ok(())
}

pub(crate) fn reset(job: &mut Job, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if job.state() != JobState::Canceled {
        return Err(illegal("reset", job));
    }
    let header = job.header_mut();
    header.state = JobState::Submitted;
    header.last_update = now;
    Ok(())
}

pub(crate) fn cancel(job: &mut Job, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    if matches!(job.state(), JobState::Done | JobState::Canceled | JobState::Failed) {
        return Err(illegal("cancel", job));
    }
    let header = job.header_mut();
    header.state = JobState::Canceled;
    header.last_update = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_model::job::JobHeader;

    fn fc_job(state: JobState) -> Job {
        Job::FcLfcs {
            header: JobHeader::new("113541082053".into(), state, Utc::now()),
            friend_code: "113541082053".into(),
        }
    }

    #[test]
    fn full_round_trip_back_to_waiting() {
        let mut job = fc_job(JobState::Submitted);
        prepare(&mut job).unwrap();
        assert_eq!(job.state(), JobState::Ready);
        cancel(&mut job, Utc::now()).unwrap();
        assert_eq!(job.state(), JobState::Canceled);
        reset(&mut job, Utc::now()).unwrap();
        assert_eq!(job.state(), JobState::Submitted);
        prepare(&mut job).unwrap();
        queue(&mut job).unwrap();
        assert_eq!(job.state(), JobState::Waiting);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut job = fc_job(JobState::Submitted);
        assert!(queue(&mut job).is_err());
    }

    #[test]
    fn failed_jobs_cannot_be_canceled() {
        let mut job = fc_job(JobState::Failed);
        assert!(cancel(&mut job, Utc::now()).is_err());
    }
}
