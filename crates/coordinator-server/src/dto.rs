//! Request/response shapes for the JSON API (§6). Parsing and
//! validating these into the core's plain Rust types is the HTTP
//! adapter's job, not the coordinator's.

use coordinator_engine::JobSubmission;
use coordinator_model::error::CoordinatorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SubmissionEntry {
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
        /// Hex-encoded, present only when not relying on a chained prereq.
        lfcs: Option<String>,
    },
}

impl SubmissionEntry {
    pub fn into_submission(self) -> Result<JobSubmission, CoordinatorError> {
        Ok(match self {
            SubmissionEntry::FcLfcs { friend_code } => JobSubmission::FcLfcs { friend_code },
            SubmissionEntry::MiiLfcs { system_id, model, year } => JobSubmission::MiiLfcs { system_id, model, year },
            SubmissionEntry::Msed { id0, lfcs } => {
                let lfcs = lfcs
                    .map(|h| hex::decode(&h).map_err(|_| CoordinatorError::invalid_fields(&["lfcs"])))
                    .transpose()?;
                JobSubmission::Msed { id0, lfcs }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobChainBody {
    #[serde(default)]
    pub overwrite_canceled: bool,
    pub jobs: Vec<SubmissionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RequestJobQuery {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default, rename = "type")]
    pub worker_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobBody {
    pub format: CompleteFormat,
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompleteFormat {
    B64,
    Hex,
    None,
}

#[derive(Debug, Deserialize)]
pub struct FailJobBody {
    pub note: Option<String>,
}

/// `?live=true` restricts an admin worker listing to those that
/// haven't timed out.
#[derive(Debug, Deserialize)]
pub struct LiveFilter {
    #[serde(default)]
    pub live: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub result: &'static str,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Envelope { result: "success", data }
    }
}
