//! Worker (miner) records: last-seen tracking, keyed by name.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What kind of compute client a worker identifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Miiner,
    Friendbot,
}

impl WorkerKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "miiner" => Some(WorkerKind::Miiner),
            "friendbot" => Some(WorkerKind::Friendbot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub name: String,
    pub kind: Option<WorkerKind>,
    pub ip: Option<String>,
    pub version: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl Worker {
    pub fn new(name: String, now: DateTime<Utc>) -> Self {
        Worker {
            name,
            kind: None,
            ip: None,
            version: None,
            last_update: now,
        }
    }

    /// Upserts the optional fields; only fields that are `Some` overwrite.
    pub fn touch(
        &mut self,
        now: DateTime<Utc>,
        kind: Option<WorkerKind>,
        ip: Option<String>,
        version: Option<String>,
    ) {
        self.last_update = now;
        if kind.is_some() {
            self.kind = kind;
        }
        if ip.is_some() {
            self.ip = ip;
        }
        if version.is_some() {
            self.version = version;
        }
    }

    pub fn has_timed_out(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now > self.last_update + timeout
    }
}
