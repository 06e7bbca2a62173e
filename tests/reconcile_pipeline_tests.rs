//! Integration tests for the reconciliation pipeline
//!
//! These tests verify the rules the pipeline is built on:
//! - Checksum identity extraction from release titles
//! - Quality band acceptance
//! - Missing/present reconciliation semantics
//! - Missing-report CSV format

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// Checksum Identity Tests
// ============================================================================

/// Bracketed 8-hex checksum token, as embedded in release titles
static CHECKSUM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Fa-f0-9]{8})\]").unwrap());

/// Rightmost bracketed token is the content checksum; earlier lookalikes
/// are release-group tags.
fn identity_of(title: &str) -> Option<String> {
    CHECKSUM_TOKEN
        .captures_iter(title)
        .last()
        .map(|caps| caps[1].to_uppercase())
}

mod identity_rules {
    use super::*;

    #[test]
    fn test_typical_release_title() {
        let title = "[One Pace][1-7] Romance Dawn 01 [1080p][F9E63A18].mkv";
        assert_eq!(identity_of(title).as_deref(), Some("F9E63A18"));
    }

    #[test]
    fn test_rightmost_token_wins_over_group_tag() {
        let title = "[DEADBEEF][One Pace] Orange Town 03 [720p][0BADF00D].mkv";
        assert_eq!(identity_of(title).as_deref(), Some("0BADF00D"));
    }

    #[test]
    fn test_identity_is_case_normalized() {
        assert_eq!(identity_of("[f9e63a18]").as_deref(), Some("F9E63A18"));
    }

    #[test]
    fn test_titles_without_token_have_no_identity() {
        assert_eq!(identity_of("[One Pace] Romance Dawn 01 [1080p].mkv"), None);
        assert_eq!(identity_of("[1080p]"), None); // too short
        assert_eq!(identity_of("[F9E63A181]"), None); // too long
        assert_eq!(identity_of("[GHIJKLMN]"), None); // not hex
    }

    #[test]
    fn test_checksum_value_matches_known_crc32() {
        // CRC32 of the classic check string, formatted the way local
        // files are recorded
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"123456789");
        let formatted = format!("{:08X}", hasher.finalize());
        assert_eq!(formatted, "CBF43926");
        assert!(identity_of(&format!("[One Pace] Ep [{formatted}]")).is_some());
    }
}

// ============================================================================
// Quality Band Tests
// ============================================================================

mod quality_band {
    use super::*;

    static RESOLUTION_TOKEN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\[(\d{3,4})p\]").unwrap());

    /// Accepted band: preferred resolution plus one lower fallback
    fn in_band(title: &str, preferred: u32, fallback: u32) -> bool {
        RESOLUTION_TOKEN.captures_iter(title).any(|caps| {
            caps[1]
                .parse::<u32>()
                .is_ok_and(|res| res == preferred || res == fallback)
        })
    }

    #[test]
    fn test_preferred_and_fallback_accepted() {
        assert!(in_band("[One Pace] Ep [1080p][AAAA1111]", 1080, 720));
        assert!(in_band("[One Pace] Ep [720p][AAAA1111]", 1080, 720));
    }

    #[test]
    fn test_out_of_band_rejected() {
        assert!(!in_band("[One Pace] Ep [480p][AAAA1111]", 1080, 720));
        assert!(!in_band("[One Pace] Ep [2160p][AAAA1111]", 1080, 720));
    }

    #[test]
    fn test_missing_marker_rejected() {
        // No resolution marker at all must not pass the band check
        assert!(!in_band("[One Pace] Ep [AAAA1111]", 1080, 720));
    }

    #[test]
    fn test_marker_matching_is_case_insensitive() {
        assert!(in_band("[One Pace] Ep [1080P][AAAA1111]", 1080, 720));
    }
}

// ============================================================================
// Reconciliation Semantics Tests
// ============================================================================

mod reconciliation {
    use super::*;

    /// Remote entries absent locally, in remote fetch order
    fn missing<'a>(local: &HashSet<&str>, remote: &[&'a str]) -> Vec<&'a str> {
        remote
            .iter()
            .filter(|crc| !local.contains(*crc))
            .copied()
            .collect()
    }

    #[test]
    fn test_missing_is_remote_minus_local() {
        let local: HashSet<&str> = ["AAAA1111", "BBBB2222"].into_iter().collect();
        let remote = ["AAAA1111", "CCCC3333", "DDDD4444"];
        assert_eq!(missing(&local, &remote), vec!["CCCC3333", "DDDD4444"]);
    }

    #[test]
    fn test_empty_local_inventory_misses_everything() {
        let remote = ["AAAA1111", "BBBB2222"];
        assert_eq!(missing(&HashSet::new(), &remote), remote.to_vec());
    }

    #[test]
    fn test_full_local_inventory_misses_nothing() {
        let local: HashSet<&str> = ["AAAA1111", "BBBB2222"].into_iter().collect();
        assert!(missing(&local, &["AAAA1111", "BBBB2222"]).is_empty());
    }

    #[test]
    fn test_fetch_order_is_preserved() {
        // The report diff must be stable run to run, so the missing list
        // follows the remote fetch order rather than any sorted order
        let remote = ["CCCC3333", "AAAA1111", "BBBB2222"];
        assert_eq!(missing(&HashSet::new(), &remote), remote.to_vec());
    }

    #[test]
    fn test_extra_local_content_is_ignored() {
        // Local files unknown to the catalog never appear as missing
        let local: HashSet<&str> = ["AAAA1111", "FFFF9999"].into_iter().collect();
        assert!(missing(&local, &["AAAA1111"]).is_empty());
    }
}

// ============================================================================
// Missing Report Format Tests
// ============================================================================

mod report_format {
    use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

    const HEADERS: [&str; 3] = ["Title", "Page Link", "Magnet Link"];

    #[test]
    fn test_report_headers_and_quoting() {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());
        writer.write_record(HEADERS).unwrap();
        writer
            .write_record([
                "[One Pace] Ep 1 [1080p][AAAA1111].mkv",
                "https://nyaa.si/view/101",
                "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567",
            ])
            .unwrap();

        let content = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(content.starts_with("\"Title\",\"Page Link\",\"Magnet Link\"\n"));
        assert!(content.contains("\"https://nyaa.si/view/101\""));
    }

    #[test]
    fn test_report_rows_read_back_by_column() {
        let raw = "\"Title\",\"Page Link\",\"Magnet Link\"\n\
                   \"[One Pace] Ep 1 [1080p][AAAA1111].mkv\",\"https://nyaa.si/view/101\",\"\"\n\
                   \"[One Pace] Ep 2 [720p][BBBB2222].mkv\",\"https://nyaa.si/view/102\",\"magnet:?xt=urn:btih:aaa\"\n";
        let mut reader = ReaderBuilder::new().from_reader(raw.as_bytes());

        let magnet_column = reader
            .headers()
            .unwrap()
            .iter()
            .position(|h| h == "Magnet Link")
            .unwrap();
        let magnets: Vec<String> = reader
            .records()
            .map(|r| r.unwrap())
            .filter_map(|r| r.get(magnet_column).map(str::to_string))
            .filter(|m| m.starts_with("magnet:"))
            .collect();
        assert_eq!(magnets, vec!["magnet:?xt=urn:btih:aaa".to_string()]);
    }
}
