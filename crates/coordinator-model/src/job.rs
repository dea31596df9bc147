//! The job record: a tagged variant (sum type) over the three job
//! kinds, sharing one header, replacing the source's multiple-
//! inheritance `Job`/`MiiJob`/`Part1Job` class hierarchy.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The `type` attribute: what a job computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    FcLfcs,
    MiiLfcs,
    Msed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::FcLfcs => "fc-lfcs",
            JobKind::MiiLfcs => "mii-lfcs",
            JobKind::Msed => "msed",
        }
    }
}

/// Console model for a `mii-lfcs` job; bounds the offset search space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleModel {
    Old,
    New,
}

impl ConsoleModel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "old" => Some(ConsoleModel::Old),
            "new" => Some(ConsoleModel::New),
            _ => None,
        }
    }

    /// `lfcs_max`, right-shifted by 16, per the console's address space.
    pub fn max_shifted(&self) -> u32 {
        match self {
            ConsoleModel::Old => 0x0B00_0000 >> 16,
            ConsoleModel::New => 0x0500_0000 >> 16,
        }
    }
}

/// Per-job lifecycle state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    NeedPrereq,
    Ready,
    Waiting,
    Working,
    Canceled,
    Failed,
    Done,
}

/// Fields common to every job kind.
#[derive(Debug, Clone)]
pub struct JobHeader {
    pub key: String,
    pub state: JobState,
    pub note: Option<String>,
    pub created: DateTime<Utc>,
    pub assignee: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl JobHeader {
    pub fn new(key: String, state: JobState, now: DateTime<Utc>) -> Self {
        JobHeader {
            key,
            state,
            note: None,
            created: now,
            assignee: None,
            last_update: now,
        }
    }

    pub fn has_timed_out(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now > self.last_update + timeout
    }
}

/// Progress tracking for a `mii-lfcs` split parent (§4.6).
#[derive(Debug, Clone)]
pub struct SplitProgress {
    pub count: u32,
    pub istart: u32,
    /// One bit per offset in `[0, count)`: set once issued or done.
    bits: Vec<u8>,
    /// subkey (big-endian hex of the index) -> in-flight sub-job.
    pub in_flight: std::collections::BTreeMap<String, InFlightOffset>,
}

#[derive(Debug, Clone)]
pub struct InFlightOffset {
    pub index: u32,
    pub assignee: Option<String>,
}

impl SplitProgress {
    pub fn new(count: u32, istart: u32) -> Self {
        SplitProgress {
            count,
            istart,
            bits: vec![0u8; count.div_ceil(8) as usize],
            in_flight: std::collections::BTreeMap::new(),
        }
    }

    pub fn is_set(&self, idx: u32) -> bool {
        let byte = self.bits[(idx / 8) as usize];
        (byte >> (idx % 8)) & 1 == 1
    }

    pub fn set(&mut self, idx: u32) {
        self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    pub fn clear(&mut self, idx: u32) {
        self.bits[(idx / 8) as usize] &= !(1 << (idx % 8));
    }

    pub fn popcount(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    pub fn all_issued(&self) -> bool {
        self.popcount() == self.count
    }
}

/// A job, tagged by kind, carrying only the fields that kind needs.
#[derive(Debug, Clone)]
pub enum Job {
    FcLfcs {
        header: JobHeader,
        friend_code: String,
    },
    MiiLfcs {
        header: JobHeader,
        system_id: String,
        model: ConsoleModel,
        year: Option<u32>,
        split: SplitProgress,
    },
    Msed {
        header: JobHeader,
        id0: String,
        /// Supplied directly, or populated once the prereq completes.
        lfcs: Option<Vec<u8>>,
        prereq_key: Option<String>,
    },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::FcLfcs { .. } => JobKind::FcLfcs,
            Job::MiiLfcs { .. } => JobKind::MiiLfcs,
            Job::Msed { .. } => JobKind::Msed,
        }
    }

    pub fn header(&self) -> &JobHeader {
        match self {
            Job::FcLfcs { header, .. } => header,
            Job::MiiLfcs { header, .. } => header,
            Job::Msed { header, .. } => header,
        }
    }

    pub fn header_mut(&mut self) -> &mut JobHeader {
        match self {
            Job::FcLfcs { header, .. } => header,
            Job::MiiLfcs { header, .. } => header,
            Job::Msed { header, .. } => header,
        }
    }

    pub fn key(&self) -> &str {
        &self.header().key
    }

    pub fn state(&self) -> JobState {
        self.header().state
    }

    /// The explicit wire projection replacing the source's ad hoc
    /// `__iter__`-as-dict serialisation.
    pub fn to_wire(&self) -> JobWire {
        let h = self.header();
        let common = WireCommon {
            key: h.key.clone(),
            status: h.state,
            note: h.note.clone(),
            created: h.created,
            assignee: h.assignee.clone(),
            last_update: h.last_update,
        };
        match self {
            Job::FcLfcs { friend_code, .. } => JobWire::FcLfcs {
                common,
                friend_code: friend_code.clone(),
            },
            Job::MiiLfcs {
                system_id,
                model,
                year,
                split,
                ..
            } => JobWire::MiiLfcs {
                common,
                system_id: system_id.clone(),
                model: *model,
                year: *year,
                offsets_done: split.popcount(),
                offsets_total: split.count,
            },
            Job::Msed {
                id0,
                lfcs,
                prereq_key,
                ..
            } => JobWire::Msed {
                common,
                id0: id0.clone(),
                lfcs: lfcs.as_ref().map(hex::encode),
                prereq_key: prereq_key.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WireCommon {
    pub key: String,
    pub status: JobState,
    pub note: Option<String>,
    pub created: DateTime<Utc>,
    pub assignee: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl JobWire {
    pub fn type_name(&self) -> &'static str {
        match self {
            JobWire::FcLfcs { .. } => "fc-lfcs",
            JobWire::MiiLfcs { .. } => "mii-lfcs",
            JobWire::Msed { .. } => "msed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum JobWire {
    #[serde(rename = "fc-lfcs")]
    FcLfcs {
        #[serde(flatten)]
        common: WireCommon,
        friend_code: String,
    },
    #[serde(rename = "mii-lfcs")]
    MiiLfcs {
        #[serde(flatten)]
        common: WireCommon,
        system_id: String,
        model: ConsoleModel,
        year: Option<u32>,
        offsets_done: u32,
        offsets_total: u32,
    },
    #[serde(rename = "msed")]
    Msed {
        #[serde(flatten)]
        common: WireCommon,
        id0: String,
        lfcs: Option<String>,
        prereq_key: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_progress_tracks_popcount() {
        let mut p = SplitProgress::new(20, 5);
        assert_eq!(p.popcount(), 0);
        p.set(5);
        p.set(6);
        assert_eq!(p.popcount(), 2);
        assert!(p.is_set(5));
        p.clear(5);
        assert!(!p.is_set(5));
        assert_eq!(p.popcount(), 1);
    }

    #[test]
    fn job_kind_round_trips_through_string() {
        assert_eq!(JobKind::FcLfcs.as_str(), "fc-lfcs");
        assert_eq!(JobKind::MiiLfcs.as_str(), "mii-lfcs");
        assert_eq!(JobKind::Msed.as_str(), "msed");
    }
}
