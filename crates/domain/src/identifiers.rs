//! Human-readable business identifiers (`EVD-2025-7K2M9QXA`).
//!
//! Distinct from the opaque store id. Nothing here checks for collisions; the
//! 36^8 space for evidence numbers is treated as large enough.

use rand::Rng;
use time::OffsetDateTime;

pub const EVIDENCE_PREFIX: &str = "EVD";
pub const BADGE_PREFIX: &str = "OFC";
pub const CASE_PREFIX: &str = "CASE";
pub const OB_PREFIX: &str = "OB";
pub const REPORT_PREFIX: &str = "RPT";

pub const DEFAULT_SUFFIX_LEN: usize = 8;
/// Badge, case and OB numbers carry a shorter suffix than evidence numbers.
pub const SHORT_SUFFIX_LEN: usize = 6;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn generate(prefix: &str) -> String {
    generate_with_len(prefix, DEFAULT_SUFFIX_LEN)
}

pub fn generate_with_len(prefix: &str, suffix_len: usize) -> String {
    let year = OffsetDateTime::now_utc().year();
    format!("{prefix}-{year}-{}", random_suffix(suffix_len))
}

pub fn evidence_number() -> String {
    generate(EVIDENCE_PREFIX)
}

pub fn badge_number() -> String {
    generate_with_len(BADGE_PREFIX, SHORT_SUFFIX_LEN)
}

pub fn case_number() -> String {
    generate_with_len(CASE_PREFIX, SHORT_SUFFIX_LEN)
}

pub fn ob_number() -> String {
    generate_with_len(OB_PREFIX, SHORT_SUFFIX_LEN)
}

/// `RPT-<epoch ms>`; reports are numbered by creation instant, not by year.
pub fn report_number(now_ms: i64) -> String {
    format!("{REPORT_PREFIX}-{now_ms}")
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shape(value: &str, prefix: &str, suffix_len: usize) {
        let parts: Vec<&str> = value.split('-').collect();
        assert_eq!(parts.len(), 3, "unexpected identifier {value}");
        assert_eq!(parts[0], prefix);
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|ch| ch.is_ascii_digit()));
        assert_eq!(parts[2].len(), suffix_len);
        assert!(
            parts[2]
                .chars()
                .all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase())
        );
    }

    #[test]
    fn evidence_numbers_follow_format() {
        for _ in 0..200 {
            assert_shape(&evidence_number(), "EVD", 8);
        }
    }

    #[test]
    fn badge_case_and_ob_numbers_follow_format() {
        for _ in 0..50 {
            assert_shape(&badge_number(), "OFC", 6);
            assert_shape(&case_number(), "CASE", 6);
            assert_shape(&ob_number(), "OB", 6);
        }
    }

    #[test]
    fn report_number_embeds_creation_ms() {
        assert_eq!(report_number(1_700_000_000_123), "RPT-1700000000123");
    }

    #[test]
    fn year_is_current() {
        let year = OffsetDateTime::now_utc().year().to_string();
        assert!(evidence_number().starts_with(&format!("EVD-{year}-")));
    }
}
