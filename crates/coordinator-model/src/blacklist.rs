//! Friend codes known to be copied from public video guides instead
//! of the submitter's own console, rejected independently of checksum
//! validity.

/// These friend codes are taken either from video guides or
/// friendbot's FCs. Users often enter the friend code seen in a guide
/// instead of their own.
const KNOWN_FRIEND_CODES: &[&str] = &[
    "113541082053",
    "281029350533",
    "190853507948",
    "504323700474",
    "044826694144",
    "448554640094",
    "242389963248",
    "285283849153",
    "435668835763",
    "345470646642",
    "139284223032",
    "392718681180",
    "332569869337",
    "422783820021",
    "238097183111",
    "109249029780",
    "517271779247",
    "220920415112",
    "384125672247",
    "143609644804",
    "354064119835",
    "547304741531",
    "233801992881",
];

pub fn is_blacklisted(friend_code: &str) -> bool {
    KNOWN_FRIEND_CODES.contains(&friend_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_known_codes() {
        assert!(is_blacklisted("113541082053"));
        assert!(!is_blacklisted("999999999999"));
    }
}
