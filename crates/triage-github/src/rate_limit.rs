//! `parse_rate_limit`: reads `X-RateLimit-Remaining` and
//! `X-RateLimit-Reset` off a response's headers. Absent headers leave the
//! corresponding field `None`; this is the only place in the workspace that
//! knows about `reqwest::header::HeaderMap`.

use reqwest::header::HeaderMap;

use triage_protocol::RateLimitInfo;

pub fn parse_rate_limit(headers: &HeaderMap) -> RateLimitInfo {
    RateLimitInfo {
        remaining: header_i64(headers, "x-ratelimit-remaining"),
        reset_at: header_i64(headers, "x-ratelimit-reset"),
    }
}

pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    header_i64(headers, "retry-after").map(|v| v.max(0) as u64)
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
