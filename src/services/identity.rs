//! Checksum identity extraction and quality gating
//!
//! The remote listing embeds a CRC32 checksum in square brackets somewhere
//! in the release title, e.g.
//! `[One Pace][1-7] Romance Dawn 01 [1080p][F9E63A18].mkv`. Release-group
//! tags can also look like 8-hex tokens, so when several candidates are
//! present the rightmost one wins: convention places the genuine content
//! checksum at the end.
//!
//! The quality gate is evaluated before, and independently of, extraction.
//! It is a policy parameter rather than hard-coded logic because the
//! accepted band is a deployment choice (strictly one resolution, or a
//! preferred resolution with a lower fallback).

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches an 8-hex-digit checksum token enclosed in square brackets
static CHECKSUM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Fa-f0-9]{8})\]").unwrap());

/// Matches resolution markers like [1080p], [720p] (case insensitive)
static RESOLUTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[(\d{3,4})p\]").unwrap());

/// Accepted-resolution policy for the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPolicy {
    /// Exactly one accepted resolution
    Exact(u32),
    /// A preferred resolution with a single lower-resolution fallback
    PreferredWithFallback { preferred: u32, fallback: u32 },
}

impl QualityPolicy {
    fn accepts_resolution(&self, res: u32) -> bool {
        match *self {
            QualityPolicy::Exact(target) => res == target,
            QualityPolicy::PreferredWithFallback { preferred, fallback } => {
                res == preferred || res == fallback
            }
        }
    }
}

/// Predicate restricting accepted remote entries to a resolution band and
/// a provenance marker.
#[derive(Debug, Clone)]
pub struct QualityGate {
    policy: QualityPolicy,
    /// Project/fan-group marker that must be present, e.g. "[One Pace]"
    provenance_marker: String,
}

impl QualityGate {
    pub fn new(policy: QualityPolicy, provenance_marker: impl Into<String>) -> Self {
        Self { policy, provenance_marker: provenance_marker.into() }
    }

    /// Whether the given title/filename text passes the gate.
    ///
    /// Rejects when no recognized resolution marker is present, when every
    /// marker falls outside the accepted band, or when the provenance
    /// marker is missing. Matching is case-insensitive.
    pub fn accepts(&self, text: &str) -> bool {
        if !text.to_lowercase().contains(&self.provenance_marker.to_lowercase()) {
            return false;
        }
        // No marker at all, or only out-of-band markers, rejects
        RESOLUTION_REGEX.captures_iter(text).any(|caps| {
            caps[1]
                .parse::<u32>()
                .is_ok_and(|res| self.policy.accepts_resolution(res))
        })
    }
}

/// Extract the checksum identity from title or filename text.
///
/// Returns the rightmost bracketed 8-hex token, uppercased, or None when
/// the text carries no such token. This is the high-frequency silent-drop
/// path for rows the listing formats differently.
pub fn extract_checksum(text: &str) -> Option<String> {
    CHECKSUM_REGEX
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].to_uppercase())
}

/// Apply the gate and extract an identity from a single title.
pub fn gated_checksum(gate: &QualityGate, text: &str) -> Option<String> {
    if !gate.accepts(text) {
        return None;
    }
    extract_checksum(text)
}

/// File-list fallback: scan per-item filenames in order and return the
/// first gated identity found.
pub fn gated_checksum_from_filenames<'a, I>(gate: &QualityGate, filenames: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    filenames
        .into_iter()
        .find_map(|name| gated_checksum(gate, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::new(
            QualityPolicy::PreferredWithFallback { preferred: 1080, fallback: 720 },
            "[One Pace]",
        )
    }

    #[test]
    fn test_rightmost_token_wins() {
        assert_eq!(
            extract_checksum("[AAA][One Pace][1080p][DEADBEEF]").as_deref(),
            Some("DEADBEEF")
        );
    }

    #[test]
    fn test_release_group_lookalike_is_skipped() {
        // "AAAABBBB" looks like a checksum but sits before the real one
        let title = "[AAAABBBB][One Pace] Ep 12 [1080p][12345678].mkv";
        assert_eq!(extract_checksum(title).as_deref(), Some("12345678"));
    }

    #[test]
    fn test_checksum_is_uppercased() {
        assert_eq!(extract_checksum("[deadbeef]").as_deref(), Some("DEADBEEF"));
    }

    #[test]
    fn test_no_token_no_identity() {
        assert_eq!(extract_checksum("[One Pace] Ep 1 [1080p]"), None);
        assert_eq!(extract_checksum("[TOOLONG123]"), None);
        assert_eq!(extract_checksum("[XYZ45678]"), None);
    }

    #[test]
    fn test_gate_rejects_out_of_band_resolution() {
        assert_eq!(gated_checksum(&gate(), "[One Pace] Ep 1 [4K][ABCDEF01]"), None);
        assert_eq!(gated_checksum(&gate(), "[One Pace] Ep 1 [480p][ABCDEF01]"), None);
        assert_eq!(gated_checksum(&gate(), "[One Pace] Ep 1 [2160p][ABCDEF01]"), None);
    }

    #[test]
    fn test_gate_rejects_missing_resolution_marker() {
        assert_eq!(gated_checksum(&gate(), "[One Pace] Ep 1 [ABCDEF01]"), None);
    }

    #[test]
    fn test_gate_requires_provenance_marker() {
        assert_eq!(gated_checksum(&gate(), "[Other Group] Ep 1 [1080p][ABCDEF01]"), None);
    }

    #[test]
    fn test_gate_is_case_insensitive() {
        assert_eq!(
            gated_checksum(&gate(), "[one pace] Ep 1 [1080P][ABCDEF01]").as_deref(),
            Some("ABCDEF01")
        );
    }

    #[test]
    fn test_fallback_resolution_accepted() {
        assert_eq!(
            gated_checksum(&gate(), "[One Pace] Ep 1 [720p][ABCDEF01]").as_deref(),
            Some("ABCDEF01")
        );
    }

    #[test]
    fn test_exact_policy_rejects_fallback() {
        let strict = QualityGate::new(QualityPolicy::Exact(1080), "[One Pace]");
        assert_eq!(gated_checksum(&strict, "[One Pace] Ep 1 [720p][ABCDEF01]"), None);
        assert_eq!(
            gated_checksum(&strict, "[One Pace] Ep 1 [1080p][ABCDEF01]").as_deref(),
            Some("ABCDEF01")
        );
    }

    #[test]
    fn test_file_list_fallback_first_match_terminates() {
        let names = [
            "readme.txt",
            "[One Pace] Ep 3 [1080p][11112222].mkv",
            "[One Pace] Ep 4 [1080p][33334444].mkv",
        ];
        assert_eq!(
            gated_checksum_from_filenames(&gate(), names.iter().copied()).as_deref(),
            Some("11112222")
        );
    }
}
