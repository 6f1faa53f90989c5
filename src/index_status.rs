// `url check-index`: decide whether a page is indexed and, if not, why.

use crate::api::{ApiClient, CrawlIssue};
use crate::diagnosis::{self, SENTINEL_DATE};
use crate::error::Result;
use crate::output::Record;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

pub const NO_CRAWL_ISSUE_REASON: &str = "No explicit crawl issue returned by Bing API for this URL.";

/// `GetUrlInfo` fields copied into the result (camel-cased).
const DETAIL_FIELDS: &[&str] = &[
    "HttpCode",
    "HttpStatus",
    "CrawlDate",
    "LastCrawledDate",
    "DiscoveryDate",
    "IsPage",
    "Indexable",
    "LastCrawlTime",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub site_url: String,
    pub url: String,
    pub is_indexed: bool,
    pub reason: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl_issues: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl_issue_code: Option<u32>,
    /// The matched crawl-issue entry as compact JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl_issue_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Record for IndexStatus {
    const COLUMNS: &'static [&'static str] = &["siteUrl", "url", "isIndexed", "reason"];
}

/// Fetch URL info, and crawl issues only when the page is not indexed.
pub fn check_index(client: &ApiClient, site_url: &str, url: &str, explain: bool) -> Result<IndexStatus> {
    let info = client.get_url_info(site_url, url)?;
    let issues = if is_indexed(&info) {
        None
    } else {
        Some(client.get_crawl_issues(site_url)?)
    };
    Ok(build_status(site_url, url, &info, issues.as_deref(), explain))
}

/// Indexed state from the first explicit boolean, else from crawl signals.
pub fn is_indexed(info: &Map<String, Value>) -> bool {
    for key in ["IsIndexed", "isIndexed", "Indexed", "indexable"] {
        if let Some(flag) = info.get(key).and_then(Value::as_bool) {
            return flag;
        }
    }
    // IsPage=true alone does not mean the page is served from the index.
    if info.get("IsPage").and_then(Value::as_bool) == Some(false) {
        return false;
    }
    let real_date = |key: &str| {
        info.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.contains(SENTINEL_DATE))
    };
    info.get("HttpStatus").and_then(Value::as_i64) == Some(200)
        && (real_date("LastCrawledDate") || real_date("DiscoveryDate"))
}

pub fn build_status(
    site_url: &str,
    url: &str,
    info: &Map<String, Value>,
    crawl_issues: Option<&[CrawlIssue]>,
    explain: bool,
) -> IndexStatus {
    let indexed = crawl_issues.is_none();
    let mut status = IndexStatus {
        site_url: site_url.to_string(),
        url: url.to_string(),
        is_indexed: indexed,
        reason: String::new(),
        details: pick_details(info),
        crawl_issues: None,
        crawl_issue_code: None,
        crawl_issue_raw: None,
        explanation: None,
    };

    let mut explanations = Vec::new();
    if let Some(issues) = crawl_issues {
        let wanted = url.trim().to_lowercase();
        match issues.iter().find(|i| i.url.trim().to_lowercase() == wanted) {
            Some(issue) => {
                debug!(url, code = ?issue.code, "matched crawl issue");
                status.crawl_issue_raw = Some(issue.raw.to_string());
                status.reason = match issue.code {
                    Some(code) => {
                        let flags = diagnosis::decode(code);
                        status.crawl_issues = Some(diagnosis::flag_names(&flags));
                        status.crawl_issue_code = Some(code);
                        diagnosis::diagnose(&flags)
                    }
                    None => format!("Issue details: {}", issue.raw),
                };
                explanations.push(format!("Crawl issue: {}", status.reason));
            }
            None => {
                status.reason = NO_CRAWL_ISSUE_REASON.to_string();
                explanations.push(status.reason.clone());
            }
        }
        if explain {
            explanations.extend(diagnosis::explanation_hints(info));
        }
    }

    if explain {
        status.explanation = Some(diagnosis::unique_non_empty(&explanations).join(" | "));
    }
    status
}

fn pick_details(info: &Map<String, Value>) -> Map<String, Value> {
    DETAIL_FIELDS
        .iter()
        .filter_map(|key| info.get(*key).map(|v| (camel_case(key), v.clone())))
        .collect()
}

fn camel_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn issue(url: &str, code: u32) -> CrawlIssue {
        CrawlIssue {
            url: url.to_string(),
            code: Some(code),
            raw: json!({"Url": url, "Issues": code}),
        }
    }

    #[test]
    fn placeholder_record_is_not_indexed() {
        let info = obj(json!({
            "IsPage": true,
            "HttpStatus": 0,
            "DiscoveryDate": "/Date(-62135568000000-0800)/",
            "LastCrawledDate": "/Date(-62135568000000-0800)/"
        }));
        assert!(!is_indexed(&info));
    }

    #[test]
    fn crawled_page_with_200_is_indexed() {
        let info = obj(json!({
            "HttpStatus": 200,
            "LastCrawledDate": "/Date(1705305600000-0800)/"
        }));
        assert!(is_indexed(&info));
        assert!(!is_indexed(&obj(json!({"IsIndexed": false, "HttpStatus": 200}))));
    }

    #[test]
    fn matched_issue_sets_reason_and_flags() {
        let info = obj(json!({"Url": "https://example.com/missing", "IsPage": false, "HttpCode": 404}));
        let issues = vec![issue("https://EXAMPLE.com/missing", 1 | 4096)];
        let status = build_status(
            "https://example.com",
            "https://example.com/missing",
            &info,
            Some(issues.as_slice()),
            false,
        );
        assert!(!status.is_indexed);
        assert_eq!(status.reason, "the page returned HTTP 404 (not found)");
        assert_eq!(status.crawl_issues.as_deref(), Some("NotFound, Unknown(4096)"));
        assert_eq!(status.details.get("httpCode"), Some(&json!(404)));
        assert_eq!(
            status.crawl_issue_raw.as_deref(),
            Some(r#"{"Url":"https://EXAMPLE.com/missing","Issues":4097}"#)
        );
        assert!(status.explanation.is_none());
    }

    #[test]
    fn matched_issue_without_flags_is_named_none() {
        let info = obj(json!({"IsPage": false}));
        let issues = vec![issue("https://example.com/p", 0)];
        let status = build_status(
            "https://example.com",
            "https://example.com/p",
            &info,
            Some(issues.as_slice()),
            false,
        );
        assert_eq!(status.crawl_issues.as_deref(), Some("None"));
        assert_eq!(status.crawl_issue_code, Some(0));
        assert_eq!(status.reason, diagnosis::FALLBACK_REASON);
        let text = serde_json::to_string(&status).unwrap();
        assert!(text.contains(r#""crawlIssueRaw":"{\"Url\":\"https://example.com/p\",\"Issues\":0}""#));
    }

    #[test]
    fn unmatched_url_uses_generic_reason_and_explains() {
        let info = obj(json!({"IsPage": false, "HttpStatus": 0, "AnchorCount": 0}));
        let status = build_status(
            "https://example.com",
            "https://example.com/other",
            &info,
            Some(&[][..]),
            true,
        );
        assert_eq!(status.reason, NO_CRAWL_ISSUE_REASON);
        let explanation = status.explanation.unwrap();
        assert!(explanation.starts_with(NO_CRAWL_ISSUE_REASON));
        assert!(explanation.contains("AnchorCount=0"));
    }

    #[test]
    fn serializes_in_stable_field_order() {
        let status = build_status("https://e.com", "https://e.com/p", &Map::new(), None, false);
        let text = serde_json::to_string(&status).unwrap();
        assert_eq!(
            text,
            r#"{"siteUrl":"https://e.com","url":"https://e.com/p","isIndexed":true,"reason":""}"#
        );
    }
}
