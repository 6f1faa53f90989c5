// API client module: a small blocking HTTP client for the Bing Webmaster
// JSON API. Every public method maps to exactly one remote endpoint and
// returns typed records; failures come back as `BwmError` and are never
// retried.

use crate::credentials::ApiKey;
use crate::error::{BwmError, Result};
use crate::input::DateRange;
use crate::output::Record;
use crate::paths::Settings;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Blocking client that holds a reqwest client, the API base URL and the
/// API key sent with every call.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
}

/// A site registered for the API key's owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub site_url: String,
    pub permission_level: String,
    pub is_verified: Option<bool>,
}

impl Record for Site {
    const COLUMNS: &'static [&'static str] = &["siteUrl", "permissionLevel", "isVerified"];
}

impl Site {
    fn from_api(item: &Map<String, Value>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| item.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .unwrap_or_default()
                .to_string()
        };
        Site {
            site_url: text(&["Url", "SiteUrl", "siteUrl"]),
            permission_level: text(&["PermissionLevel", "permissionLevel"]),
            is_verified: ["IsVerified", "isVerified"]
                .iter()
                .find_map(|k| item.get(*k).and_then(Value::as_bool)),
        }
    }
}

/// One row of traffic statistics, passed through in the API's field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StatsRecord(pub Map<String, Value>);

impl Record for StatsRecord {
    const COLUMNS: &'static [&'static str] = &["Date", "Clicks", "Impressions", "siteUrl"];
}

impl StatsRecord {
    fn from_api(mut row: Map<String, Value>, site_url: &str, url: Option<&str>) -> Self {
        row.shift_remove("__type");
        if let Some(Value::String(raw)) = row.get("Date") {
            if let Some(day) = parse_wcf_date(raw) {
                row.insert("Date".to_string(), Value::String(day.to_string()));
            }
        }
        if !row.contains_key("siteUrl") {
            row.insert("siteUrl".to_string(), Value::String(site_url.to_string()));
        }
        if let Some(url) = url {
            if !row.contains_key("url") && !row.contains_key("Url") {
                row.insert("url".to_string(), Value::String(url.to_string()));
            }
        }
        StatsRecord(row)
    }
}

/// An entry from `GetCrawlIssues`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlIssue {
    pub url: String,
    /// Crawl-issue bitmask, when the API sent a number.
    pub code: Option<u32>,
    pub raw: Value,
}

impl CrawlIssue {
    fn from_api(item: Map<String, Value>) -> Self {
        let url = ["Url", "url"]
            .iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        let code = ["Issues", "Issue"]
            .iter()
            .find_map(|k| item.get(*k).and_then(Value::as_u64))
            .and_then(|c| u32::try_from(c).ok());
        CrawlIssue {
            url,
            code,
            raw: Value::Object(item),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
}

/// Per-URL outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub site_url: String,
    pub url: String,
    pub status: SubmissionStatus,
    pub reason: String,
}

impl Record for SubmissionResult {
    const COLUMNS: &'static [&'static str] = &["siteUrl", "url", "status", "reason"];
}

impl SubmissionResult {
    pub fn accepted(site_url: &str, url: &str) -> Self {
        SubmissionResult {
            site_url: site_url.to_string(),
            url: url.to_string(),
            status: SubmissionStatus::Accepted,
            reason: String::new(),
        }
    }

    pub fn rejected(site_url: &str, url: &str, reason: impl Into<String>) -> Self {
        SubmissionResult {
            site_url: site_url.to_string(),
            url: url.to_string(),
            status: SubmissionStatus::Rejected,
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SubmissionStatus::Accepted
    }
}

enum Payload<'a> {
    Query(Vec<(&'a str, String)>),
    Json(Value),
}

impl ApiClient {
    /// Create a client for `base_url` with a bounded request timeout.
    pub fn new(api_key: ApiKey, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bwm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BwmError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_settings(api_key: ApiKey, settings: &Settings) -> Result<Self> {
        Self::new(api_key, &settings.base_url, settings.timeout)
    }

    /// `GetUserSites`: every site the key can access.
    pub fn get_user_sites(&self) -> Result<Vec<Site>> {
        let data = self.call("GetUserSites", Payload::Query(Vec::new()))?;
        let items = extract_list("GetUserSites", data, &["Results", "SiteInfo", "Sites"])?;
        Ok(items.iter().map(Site::from_api).collect())
    }

    /// `GetRankAndTrafficStats`: daily site-level statistics.
    pub fn get_rank_and_traffic_stats(
        &self,
        site_url: &str,
        range: DateRange,
    ) -> Result<Vec<StatsRecord>> {
        let params = vec![
            ("siteUrl", site_url.to_string()),
            ("startDate", format_api_date(range.start)),
            ("endDate", format_api_date(range.end)),
        ];
        let data = self.call("GetRankAndTrafficStats", Payload::Query(params))?;
        let rows = extract_list("GetRankAndTrafficStats", data, &["Results", "Data", "Rows"])?;
        Ok(rows
            .into_iter()
            .map(|row| StatsRecord::from_api(row, site_url, None))
            .collect())
    }

    /// `GetUrlTrafficInfo`: statistics for one page.
    pub fn get_url_traffic_info(
        &self,
        site_url: &str,
        url: &str,
        range: DateRange,
    ) -> Result<Vec<StatsRecord>> {
        let params = vec![
            ("siteUrl", site_url.to_string()),
            ("url", url.to_string()),
            ("startDate", format_api_date(range.start)),
            ("endDate", format_api_date(range.end)),
        ];
        let data = self.call("GetUrlTrafficInfo", Payload::Query(params))?;
        let rows = match data {
            Value::Object(map) if !has_list(&map) => {
                if map.is_empty() {
                    Vec::new()
                } else {
                    vec![map]
                }
            }
            other => extract_list("GetUrlTrafficInfo", other, &["Results", "Data", "Rows"])?,
        };
        Ok(rows
            .into_iter()
            .map(|row| StatsRecord::from_api(row, site_url, Some(url)))
            .collect())
    }

    /// `GetUrlInfo`: raw index details for one page.
    pub fn get_url_info(&self, site_url: &str, url: &str) -> Result<Map<String, Value>> {
        let params = vec![("siteUrl", site_url.to_string()), ("url", url.to_string())];
        match self.call("GetUrlInfo", Payload::Query(params))? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(unexpected_shape("GetUrlInfo", "an object", &other)),
        }
    }

    /// `GetCrawlIssues`: URLs of the site with known crawl problems.
    pub fn get_crawl_issues(&self, site_url: &str) -> Result<Vec<CrawlIssue>> {
        let params = vec![("siteUrl", site_url.to_string())];
        let data = self.call("GetCrawlIssues", Payload::Query(params))?;
        let items = extract_list(
            "GetCrawlIssues",
            data,
            &["Results", "CrawlIssues", "UrlWithCrawlIssues"],
        )?;
        Ok(items.into_iter().map(CrawlIssue::from_api).collect())
    }

    /// `SubmitUrl`: queue a single page for (re)indexing.
    pub fn submit_url(&self, site_url: &str, url: &str) -> Result<SubmissionResult> {
        let body = json!({ "siteUrl": site_url, "url": url });
        let data = self.call("SubmitUrl", Payload::Json(body))?;
        let mut results = submission_outcomes(site_url, &[url.to_string()], &data);
        Ok(results.remove(0))
    }

    /// `SubmitUrlBatch`: one call for many pages, one outcome per page.
    pub fn submit_url_batch(
        &self,
        site_url: &str,
        urls: &[String],
    ) -> Result<Vec<SubmissionResult>> {
        let body = json!({ "siteUrl": site_url, "urlList": urls });
        let data = self.call("SubmitUrlBatch", Payload::Json(body))?;
        Ok(submission_outcomes(site_url, urls, &data))
    }

    fn call(&self, method: &str, payload: Payload<'_>) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let auth = [("apikey", self.api_key.expose())];
        let (verb, request): (&str, RequestBuilder) = match payload {
            Payload::Query(params) => ("GET", self.client.get(&url).query(&auth).query(&params)),
            Payload::Json(body) => ("POST", self.client.post(&url).query(&auth).json(&body)),
        };
        debug!(method, verb, "calling API");

        let res = request.send().map_err(transport_error)?;
        let status = res.status();
        let text = res.text().map_err(transport_error)?;
        debug!(method, status = status.as_u16(), "API responded");

        if !status.is_success() {
            return Err(classify_failure(method, status.as_u16(), &text));
        }
        let body = parse_body(method, &text)?;
        Ok(unwrap_envelope(method, body))
    }
}

fn transport_error(err: reqwest::Error) -> BwmError {
    // The URL carries the API key, so it never reaches the message.
    let err = err.without_url();
    if err.is_timeout() {
        BwmError::Network(format!("request timed out: {err}"))
    } else {
        BwmError::Network(err.to_string())
    }
}

fn parse_body(method: &str, text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| BwmError::Parse {
        method: method.to_string(),
        message: format!("response is not valid JSON ({e})"),
    })
}

/// Map a non-2xx response onto the error taxonomy.
pub(crate) fn classify_failure(method: &str, status: u16, body: &str) -> BwmError {
    let payload: Option<Value> = serde_json::from_str(body).ok();
    let message = error_message(payload.as_ref(), body);
    let code = payload.as_ref().and_then(error_code);

    // Explicit statuses win; the Bing ErrorCode only refines the others.
    match (status, code) {
        (401 | 403, _) => BwmError::Auth { status, message },
        (404, _) => BwmError::NotFound { status, message },
        (429, _) => BwmError::RateLimit { status, message },
        (_, Some(3 | 14)) => BwmError::Auth { status, message },
        (_, Some(4 | 5)) => BwmError::RateLimit { status, message },
        (_, Some(10 | 11)) => BwmError::NotFound { status, message },
        _ => BwmError::Api {
            method: method.to_string(),
            status,
            message,
        },
    }
}

fn error_message(payload: Option<&Value>, body: &str) -> String {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    if let Some(payload) = payload {
        for key in ["Message", "message", "error_description", "error"] {
            if let Some(message) = non_empty(payload.get(key)) {
                return message;
            }
        }
        if let Some(message) = non_empty(payload.get("d").and_then(|d| d.get("Message"))) {
            return message;
        }
    }
    let text = body.trim();
    if text.is_empty() {
        "Unknown error".to_string()
    } else {
        text.to_string()
    }
}

fn error_code(payload: &Value) -> Option<u64> {
    payload
        .get("ErrorCode")
        .or_else(|| payload.get("d").and_then(|d| d.get("ErrorCode")))
        .and_then(Value::as_u64)
}

/// Strip the `{"d": {"<Method>Result": ...}}` envelope.
pub(crate) fn unwrap_envelope(method: &str, body: Value) -> Value {
    let mut outer = match body {
        Value::Object(outer) => outer,
        other => return other,
    };
    let container = match outer.remove("d") {
        None => return Value::Object(outer),
        Some(Value::Object(container)) => container,
        Some(other) => return other,
    };

    let method_key = format!("{method}Result");
    if container.contains_key(&method_key) {
        return container.get(&method_key).cloned().unwrap_or(Value::Null);
    }
    if let Some(result) = container
        .iter()
        .find(|(k, v)| k.ends_with("Result") && v.is_object())
        .map(|(_, v)| v.clone())
    {
        return result;
    }
    Value::Object(container)
}

fn has_list(map: &Map<String, Value>) -> bool {
    map.values().any(Value::is_array)
}

/// Pull the list of row objects out of an unwrapped result.
fn extract_list(method: &str, data: Value, preferred: &[&str]) -> Result<Vec<Map<String, Value>>> {
    let items = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = preferred
                .iter()
                .map(|k| k.to_string())
                .find(|k| map.get(k).is_some_and(Value::is_array))
                .or_else(|| map.iter().find(|(_, v)| v.is_array()).map(|(k, _)| k.clone()));
            match key.and_then(|k| map.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => return Ok(Vec::new()),
            }
        }
        other => return Err(unexpected_shape(method, "a list", &other)),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn unexpected_shape(method: &str, expected: &str, got: &Value) -> BwmError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    };
    BwmError::Parse {
        method: method.to_string(),
        message: format!("expected {expected}, got {kind}"),
    }
}

/// Per-URL outcomes. An empty result means the API accepted everything;
/// per-URL entries override that for the URLs they name.
pub(crate) fn submission_outcomes(
    site_url: &str,
    urls: &[String],
    data: &Value,
) -> Vec<SubmissionResult> {
    let entries: Vec<&Map<String, Value>> = match data {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => ["Results", "UrlResults", "Urls"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    urls.iter()
        .map(|url| {
            let entry = entries.iter().find(|e| {
                ["Url", "url"]
                    .iter()
                    .find_map(|k| e.get(*k).and_then(Value::as_str))
                    .is_some_and(|u| u.trim().eq_ignore_ascii_case(url.trim()))
            });
            let Some(entry) = entry else {
                return SubmissionResult::accepted(site_url, url);
            };
            let accepted = ["Accepted", "IsSuccess", "accepted"]
                .iter()
                .find_map(|k| entry.get(*k).and_then(Value::as_bool))
                .unwrap_or(true);
            let reason = ["Message", "Reason", "Error"]
                .iter()
                .find_map(|k| entry.get(*k).and_then(Value::as_str))
                .unwrap_or_default();
            if accepted {
                SubmissionResult {
                    reason: reason.to_string(),
                    ..SubmissionResult::accepted(site_url, url)
                }
            } else if reason.is_empty() {
                SubmissionResult::rejected(site_url, url, "rejected by API")
            } else {
                SubmissionResult::rejected(site_url, url, reason)
            }
        })
        .collect()
}

/// `M/D/YYYY`, the date format the API expects.
pub fn format_api_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Parse `/Date(1700000000000)/` or `/Date(1700000000000-0800)/`.
fn parse_wcf_date(raw: &str) -> Option<NaiveDate> {
    let inner = raw.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let split = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i)
        .unwrap_or(inner.len());
    let (millis, offset) = inner.split_at(split);
    let millis: i64 = millis.parse().ok()?;

    let offset_secs = if offset.is_empty() {
        0
    } else {
        // `±hhmm`; anything else leaves the value as the API sent it.
        if offset.len() != 5 || !offset.is_ascii() {
            return None;
        }
        let sign = if offset.starts_with('-') { -1 } else { 1 };
        let hours: i32 = offset.get(1..3)?.parse().ok()?;
        let minutes: i32 = offset.get(3..5)?.parse().ok()?;
        sign * (hours * 3600 + minutes * 60)
    };
    let utc = DateTime::from_timestamp_millis(millis)?;
    let offset = FixedOffset::east_opt(offset_secs)?;
    Some(utc.with_timezone(&offset).date_naive())
}
