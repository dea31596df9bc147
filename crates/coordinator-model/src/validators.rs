//! Pure predicates on job keys and result payloads, plus client
//! version gating. Nothing here touches the filesystem, the registry,
//! or the clock.

use std::collections::{BTreeMap, BTreeSet};

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::CoordinatorError;
use crate::job::JobKind;

/// The reserved filesystem-id shape an id0 must not collide with:
/// 4 hex, then `01` or `00`, then 18 hex, then `00`, then 6 hex.
fn matches_reserved_shape(id0: &str) -> bool {
    let bytes = id0.as_bytes();
    if bytes.len() != 32 {
        return false;
    }
    let fifth_pair = &id0[4..6];
    let trailing_pair = &id0[24..26];
    (fifth_pair == "01" || fifth_pair == "00") && trailing_pair == "00"
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// 32 hex characters, excluding the reserved filesystem-id shape.
pub fn is_id0(value: &str) -> bool {
    value.len() == 32 && is_hex(value) && !matches_reserved_shape(value)
}

/// 16 lowercase hex characters.
pub fn is_system_id(value: &str) -> bool {
    value.len() == 16 && value.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// 12 decimal digits passing the 3DS friend-code checksum: the high
/// byte of `SHA1(principal_id_le32)` shifted right by one equals the
/// fifth-byte checksum.
///
/// Adapted from `verify_3ds_fc` in nh-server/Kurisu's friendcode.py.
pub fn is_friend_code(value: &str) -> bool {
    if value.len() != 12 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(fc) = value.parse::<u64>() else {
        return false;
    };
    if fc > 0x7F_FFFF_FFFF {
        return false;
    }
    let principal_id = (fc & 0xFFFF_FFFF) as u32;
    let checksum = ((fc & 0xFF_0000_0000) >> 32) as u8;
    let digest = Sha1::digest(principal_id.to_le_bytes());
    (digest[0] >> 1) == checksum
}

/// Classifies a job key by shape; `None` if it matches none of the
/// recognised shapes.
pub fn classify(key: &str) -> Option<JobKind> {
    if is_friend_code(key) {
        Some(JobKind::FcLfcs)
    } else if is_system_id(key) {
        Some(JobKind::MiiLfcs)
    } else if is_id0(key) {
        Some(JobKind::Msed)
    } else {
        None
    }
}

pub fn is_job_key(value: &str) -> bool {
    classify(value).is_some()
}

/// An lfcs result: at least 5 bytes, and the first four are not all
/// zero. Only the first five bytes are ever significant.
pub fn validate_lfcs(lfcs: &[u8]) -> bool {
    lfcs.len() >= 5 && lfcs[0..4] != [0, 0, 0, 0]
}

/// A `msed` result: either a raw 16-byte key-y or a 320-byte envelope
/// with the key-y at offset 0x110, verified against the declared id0.
pub fn validate_movable(msed: &[u8], id0: &str) -> bool {
    match msed.len() {
        320 => validate_keyy(&msed[0x110..0x120], id0),
        16 => validate_keyy(msed, id0),
        _ => false,
    }
}

/// Recomputes id0 from a 16-byte key-y and compares it against the
/// declared value.
///
/// Adapted from `id0convert.py` by zoogie (seedminer_toolbox): SHA-256
/// the key-y, take the first 16 bytes, reverse each 4-byte group in
/// place (group order is unchanged), hex-encode.
pub fn validate_keyy(keyy: &[u8], id0: &str) -> bool {
    if keyy.len() != 16 {
        return false;
    }
    let digest = Sha256::digest(keyy);
    let mut reordered = [0u8; 16];
    for group in 0..4 {
        for i in 0..4 {
            reordered[group * 4 + i] = digest[group * 4 + (3 - i)];
        }
    }
    hex::encode(reordered) == id0
}

/// A recognised client kind and the policy the server enforces for it.
#[derive(Debug, Clone)]
pub struct ClientTypePolicy {
    /// Minimum accepted version, dotted (`2.1.1-alpha`), no kind prefix.
    pub min_version: String,
    /// Job kinds this client type is allowed to request.
    pub allowed: BTreeSet<JobKind>,
}

/// The version strings a request may carry are split on `.`, `+`, or `-`.
fn split_version(raw: &str) -> Vec<&str> {
    raw.split(['.', '+', '-']).collect()
}

fn zero_pad(component: &str, width: usize) -> String {
    format!("{component:0>width$}", width = width)
}

/// Parses `<kind>-<dotted>` into `(kind, zero-padded components)`.
fn parse_typed_version(version: &str) -> (String, Vec<String>) {
    let parts = split_version(version);
    let kind = parts.first().copied().unwrap_or_default().to_string();
    let components = parts[1.min(parts.len())..]
        .iter()
        .map(|p| zero_pad(p, 10))
        .collect();
    (kind, components)
}

fn parse_version(version: &str) -> Vec<String> {
    split_version(version).iter().map(|p| zero_pad(p, 10)).collect()
}

/// Rejects missing/unrecognised/outdated client versions, or requests
/// for job kinds the client type is not allowed to serve. Returns the
/// allowed-kind set on success.
pub fn enforce_client_version(
    client_types: &BTreeMap<String, ClientTypePolicy>,
    client_version_str: Option<&str>,
    requested_kinds: &BTreeSet<JobKind>,
) -> Result<BTreeSet<JobKind>, CoordinatorError> {
    let client_version_str = client_version_str
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoordinatorError::ClientRejected("Client version not provided".into()))?;

    let (client_type, client_version) = parse_typed_version(client_version_str);
    let policy = client_types.get(&client_type).ok_or_else(|| {
        CoordinatorError::ClientRejected("Unrecognized client type".into())
    })?;

    let latest_version = parse_version(&policy.min_version);
    if client_version.len() != latest_version.len() {
        return Err(CoordinatorError::ClientRejected(
            "Error validating client version".into(),
        ));
    }
    if client_version < latest_version {
        return Err(CoordinatorError::ClientRejected(format!(
            "Outdated client version, {client_version_str} < {client_type}-{}",
            policy.min_version
        )));
    }

    if !requested_kinds.is_empty() && !requested_kinds.is_subset(&policy.allowed) {
        return Err(CoordinatorError::ClientRejected(format!(
            "Requested illegal job type for {client_type} clients"
        )));
    }

    Ok(policy.allowed.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_code_checksum() {
        assert!(is_friend_code("113541082053"));
        assert!(!is_friend_code("113541082054"));
        assert!(!is_friend_code("not-a-code12"));
        assert!(!is_friend_code("1"));
    }

    #[test]
    fn system_id_shape() {
        assert!(is_system_id("deadbeefcafebabe"));
        assert!(!is_system_id("DEADBEEFCAFEBABE"));
        assert!(!is_system_id("deadbeefcafebab"));
    }

    #[test]
    fn id0_excludes_reserved_shape() {
        // 4 hex + "00" + 18 hex + "00" + 6 hex is reserved.
        let reserved = "aaaa00".to_string() + &"b".repeat(18) + "00" + "cccccc";
        assert_eq!(reserved.len(), 32);
        assert!(!is_id0(&reserved));
        assert!(is_id0(&"a".repeat(32)));
    }

    #[test]
    fn classify_dispatches_by_shape() {
        assert_eq!(classify("113541082053"), Some(JobKind::FcLfcs));
        assert_eq!(classify("deadbeefcafebabe"), Some(JobKind::MiiLfcs));
        assert_eq!(classify(&"a".repeat(32)), Some(JobKind::Msed));
        assert_eq!(classify("garbage"), None);
    }

    #[test]
    fn lfcs_rejects_leading_zero_bytes() {
        assert!(!validate_lfcs(&[0, 0, 0, 0, 1]));
        assert!(validate_lfcs(&[1, 0, 0, 0, 1]));
        assert!(!validate_lfcs(&[1, 2, 3]));
    }

    #[test]
    fn version_gate_rejects_outdated_and_illegal_kinds() {
        let mut client_types = BTreeMap::new();
        client_types.insert(
            "miiner".to_string(),
            ClientTypePolicy {
                min_version: "2.1.1-alpha".to_string(),
                allowed: [JobKind::MiiLfcs, JobKind::Msed].into_iter().collect(),
            },
        );

        let requested: BTreeSet<JobKind> = [JobKind::MiiLfcs].into_iter().collect();
        assert!(enforce_client_version(&client_types, Some("miiner-2.1.1-alpha"), &requested).is_ok());
        assert!(enforce_client_version(&client_types, Some("miiner-2.0.0-alpha"), &requested).is_err());
        assert!(enforce_client_version(&client_types, None, &requested).is_err());
        assert!(enforce_client_version(&client_types, Some("unknown-9.9.9"), &requested).is_err());

        let illegal: BTreeSet<JobKind> = [JobKind::FcLfcs].into_iter().collect();
        assert!(enforce_client_version(&client_types, Some("miiner-2.1.1-alpha"), &illegal).is_err());
    }
}
