//! Identifier and clock helpers
//!
//! Proposal ids are UUIDv7 in simple (32 hex char) form so they sort by
//! creation time. Lock tokens are 16 random bytes rendered as hex.

/// Opaque peer identifier as handed out by the transport substrate
pub type PeerId = String;

/// Generate a fresh proposal id
pub fn new_proposal_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Proposal ids name directories on disk: ASCII letters, digits, `-` and `_` only
pub fn is_valid_proposal_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Generate a fresh random lock token
pub fn new_lock_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Wall clock in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_id_is_hex() {
        let id = new_proposal_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_proposal_ids_unique() {
        let a = new_proposal_id();
        let b = new_proposal_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_proposal_id_charset() {
        assert!(is_valid_proposal_id(&new_proposal_id()));
        assert!(is_valid_proposal_id("p-1_b"));
        assert!(!is_valid_proposal_id(""));
        assert!(!is_valid_proposal_id("x/../../etc"));
        assert!(!is_valid_proposal_id(".."));
        assert!(!is_valid_proposal_id("a b"));
        assert!(!is_valid_proposal_id("caf\u{e9}"));
    }

    #[test]
    fn test_lock_id_format() {
        let lock = new_lock_id();
        assert_eq!(lock.len(), 32);
        assert!(lock.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(lock, new_lock_id());
    }

    #[test]
    fn test_now_ms_is_recent() {
        // 2024-01-01T00:00:00Z
        assert!(now_ms() > 1_704_067_200_000);
    }
}
