// Crawl-issue diagnosis: a static table from the API's crawl-issue bit
// flags to readable reasons, plus the extra hints shown by `--explain`.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Bump when `CRAWL_ISSUE_FLAGS` is re-synced with the API's flag set.
pub const CRAWL_ISSUE_TABLE_REVISION: u32 = 1;

/// Reason reported when no flag in the set is known.
pub const FALLBACK_REASON: &str = "no specific reason available";

/// Name shown for a crawl-issue code with no bits set.
pub const NO_FLAGS_NAME: &str = "None";

/// Date value the API uses for "never".
pub const SENTINEL_DATE: &str = "-62135568000000";

/// (bit, name, reason)
pub const CRAWL_ISSUE_FLAGS: &[(u32, &str, &str)] = &[
    (1, "NotFound", "the page returned HTTP 404 (not found)"),
    (2, "BlockedByRobotsTxt", "crawling is blocked by robots.txt"),
    (4, "DisallowedByMetaTag", "indexing is disallowed by a robots meta tag"),
    (8, "Timeout", "the crawler timed out fetching the page"),
    (16, "ConnectionAborted", "the connection was aborted while fetching the page"),
    (32, "ContainsMalware", "the page was flagged as containing malware"),
    (64, "ContainsVirus", "the page was flagged as containing a virus"),
    (128, "InternalServerError", "the server returned an internal error (5xx)"),
    (256, "UnsupportedContentType", "the content type is not supported for indexing"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Known(u32),
    /// Bits not present in the table.
    Unknown(u32),
}

impl Flag {
    pub fn name(&self) -> String {
        match self {
            Flag::Known(bit) => lookup(*bit)
                .map(|(_, name, _)| name.to_string())
                .unwrap_or_else(|| format!("Unknown({bit})")),
            Flag::Unknown(bits) => format!("Unknown({bits})"),
        }
    }

    fn reason(&self) -> Option<&'static str> {
        match self {
            Flag::Known(bit) => lookup(*bit).map(|(_, _, reason)| *reason),
            Flag::Unknown(_) => None,
        }
    }
}

fn lookup(bit: u32) -> Option<&'static (u32, &'static str, &'static str)> {
    CRAWL_ISSUE_FLAGS.iter().find(|(b, _, _)| *b == bit)
}

/// Split a bitmask into table flags plus one `Unknown` for leftover bits.
pub fn decode(code: u32) -> Vec<Flag> {
    let mut flags = Vec::new();
    let mut remaining = code;
    for (bit, _, _) in CRAWL_ISSUE_FLAGS {
        if code & bit != 0 {
            flags.push(Flag::Known(*bit));
            remaining &= !bit;
        }
    }
    if remaining != 0 {
        flags.push(Flag::Unknown(remaining));
    }
    flags
}

pub fn flag_names(flags: &[Flag]) -> String {
    if flags.is_empty() {
        return NO_FLAGS_NAME.to_string();
    }
    flags.iter().map(Flag::name).collect::<Vec<_>>().join(", ")
}

/// Readable reason for a flag set; unknown flags are ignored and a set with
/// no known flag yields `FALLBACK_REASON`.
pub fn diagnose(flags: &[Flag]) -> String {
    let reasons: Vec<&str> = flags.iter().filter_map(Flag::reason).collect();
    if reasons.is_empty() {
        FALLBACK_REASON.to_string()
    } else {
        reasons.join("; ")
    }
}

/// Hints derived from raw `GetUrlInfo` fields, used by `--explain`.
pub fn explanation_hints(info: &Map<String, Value>) -> Vec<String> {
    let mut hints = Vec::new();

    match info.get("HttpStatus").and_then(Value::as_i64) {
        Some(0) => hints.push(
            "Bing reports HttpStatus=0 for this URL, which usually means no successful fetch was recorded."
                .to_string(),
        ),
        Some(status) => hints.push(format!("Bing reports last known HttpStatus={status}.")),
        None => {}
    }

    if is_sentinel(info.get("DiscoveryDate")) {
        hints.push(
            "DiscoveryDate is empty in the API, suggesting Bing has not discovered crawlable content for this URL."
                .to_string(),
        );
    }
    if is_sentinel(info.get("LastCrawledDate")) {
        hints.push(
            "LastCrawledDate is empty in the API, suggesting the URL has not been crawled successfully."
                .to_string(),
        );
    }
    if info.get("AnchorCount").and_then(Value::as_i64) == Some(0) {
        hints.push(
            "AnchorCount=0 in the API, meaning Bing has no known inbound link signals for this URL."
                .to_string(),
        );
    }
    if info.get("DocumentSize").and_then(Value::as_i64) == Some(0) {
        hints.push(
            "DocumentSize=0 in the API, indicating Bing has not stored page content for this URL."
                .to_string(),
        );
    }
    hints
}

pub fn is_sentinel(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| s.contains(SENTINEL_DATE))
}

/// Trim, drop empties and drop repeats, keeping order.
pub fn unique_non_empty(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty() && seen.insert(i.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_flag_reason_wins_over_unknown_flag() {
        let reason = diagnose(&[Flag::Known(1), Flag::Unknown(1024)]);
        assert_eq!(reason, "the page returned HTTP 404 (not found)");
    }

    #[test]
    fn unknown_only_falls_back() {
        assert_eq!(diagnose(&[Flag::Unknown(4096)]), FALLBACK_REASON);
        assert_eq!(diagnose(&[]), FALLBACK_REASON);
    }

    #[test]
    fn decode_splits_bits_and_keeps_leftovers() {
        assert_eq!(
            decode(1 | 8 | 2048),
            vec![Flag::Known(1), Flag::Known(8), Flag::Unknown(2048)]
        );
        assert!(decode(0).is_empty());
        assert_eq!(flag_names(&decode(0)), "None");
        assert_eq!(diagnose(&decode(0)), FALLBACK_REASON);
        assert_eq!(flag_names(&decode(3)), "NotFound, BlockedByRobotsTxt");
        assert_eq!(flag_names(&decode(512)), "Unknown(512)");
    }

    #[test]
    fn every_table_bit_is_a_distinct_power_of_two() {
        let mut all = 0u32;
        for (bit, _, _) in CRAWL_ISSUE_FLAGS {
            assert!(bit.is_power_of_two());
            assert_eq!(all & bit, 0);
            all |= bit;
        }
    }

    #[test]
    fn hints_cover_placeholder_record() {
        let info = json!({
            "HttpStatus": 0,
            "DiscoveryDate": "/Date(-62135568000000-0800)/",
            "LastCrawledDate": "/Date(-62135568000000-0800)/",
            "AnchorCount": 0,
            "DocumentSize": 0
        });
        let hints = explanation_hints(info.as_object().unwrap());
        assert_eq!(hints.len(), 5);
        assert!(hints[0].contains("HttpStatus=0"));
    }

    #[test]
    fn unique_non_empty_dedupes() {
        let items = vec![" a ".to_string(), "".into(), "a".into(), "b".into()];
        assert_eq!(unique_non_empty(&items), vec!["a", "b"]);
    }
}
