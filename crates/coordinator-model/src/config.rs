//! Process configuration: everything the coordinator and HTTP adapter
//! need that isn't derivable from a request. Constructed once at
//! startup from the environment and passed down; nothing below this
//! layer reads `std::env` directly.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Duration;

use crate::validators::ClientTypePolicy;

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_secs(key: &str, default: i64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default);
    Duration::seconds(secs)
}

/// Artifact store roots, one per job kind namespace.
#[derive(Debug, Clone)]
pub struct ArtifactRoots {
    pub fc_lfcs: PathBuf,
    pub mii_lfcs: PathBuf,
    pub msed: PathBuf,
}

/// Best-effort upstream mirror for already-computed `msed` artifacts.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub base: Option<String>,
    pub endpoint: Option<String>,
}

impl MirrorConfig {
    pub fn enabled(&self) -> bool {
        self.base.is_some() && self.endpoint.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub artifact_roots: ArtifactRoots,
    pub mirror: MirrorConfig,
    pub bind_addr: String,
    pub admin: AdminCredentials,
    pub client_types: BTreeMap<String, ClientTypePolicy>,
    /// §4.8: a `working` job idle longer than this is released.
    pub job_timeout: Duration,
    /// §4.3: a worker silent longer than this is considered dead.
    pub worker_timeout: Duration,
    /// §4.11: background sweep cadence.
    pub sweep_interval: Duration,
    /// §9 open question: `fail` on a sub-job releases it for reissue
    /// rather than failing the parent. Surfaced as a switch rather
    /// than hardcoded, per the source ambiguity this resolves.
    pub fail_releases_subjob: bool,
}

impl Config {
    /// Loads configuration from the environment, falling back to the
    /// documented defaults (§6) for anything unset.
    pub fn from_env() -> Self {
        let mut client_types = BTreeMap::new();
        client_types.insert(
            "miiner".to_string(),
            ClientTypePolicy {
                min_version: "2.1.1-alpha".to_string(),
                allowed: [crate::job::JobKind::MiiLfcs, crate::job::JobKind::Msed]
                    .into_iter()
                    .collect(),
            },
        );
        client_types.insert(
            "friendbot".to_string(),
            ClientTypePolicy {
                min_version: "1.0.0".to_string(),
                allowed: [crate::job::JobKind::FcLfcs].into_iter().collect(),
            },
        );

        Config {
            artifact_roots: ArtifactRoots {
                fc_lfcs: env_path("FC_LFCSES_PATH", "./fc_lfcses"),
                mii_lfcs: env_path("SID_LFCSES_PATH", "./sid_lfcses"),
                msed: env_path("MSEDS_PATH", "./mseds"),
            },
            mirror: MirrorConfig {
                base: env_opt_string("BFM_SITE_BASE"),
                endpoint: env_opt_string("BFM_SITE_ENDPOINT"),
            },
            bind_addr: format!(
                "{}:{}",
                env_string("HOST_ADDR", "127.0.0.1"),
                env_string("HOST_PORT", "7799")
            ),
            admin: AdminCredentials {
                user: env_string("ADMIN_USER", "admin"),
                pass: env_string("ADMIN_PASS", "INSECURE"),
            },
            client_types,
            job_timeout: env_secs("JOB_TIMEOUT_SECS", 5 * 60),
            worker_timeout: env_secs("WORKER_TIMEOUT_SECS", 10 * 60),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", 60),
            fail_releases_subjob: true,
        }
    }
}
