//! Conditional-request evaluation.
//!
//! A pure function set over the request's precondition headers and the
//! target's metadata. Evaluation happens in a fixed order and
//! short-circuits on the first terminal outcome; composing and sending the
//! actual 304/412 response is the caller's job.

use std::time::{SystemTime, UNIX_EPOCH};

use http::{header, HeaderMap, Method};

use crate::response::date_or_epoch;

/// The optional request headers the evaluator looks at, borrowed from the
/// parsed header table for the duration of one request.
#[derive(Debug, Default)]
pub struct ConditionalHeaders<'a> {
    pub authorization: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub if_unmodified_since: Option<&'a str>,
    pub if_match: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
    pub if_range: Option<&'a str>,
}

impl<'a> ConditionalHeaders<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        let get = |name: header::HeaderName| headers.get(&name).and_then(|value| value.to_str().ok());
        Self {
            authorization: get(header::AUTHORIZATION),
            if_modified_since: get(header::IF_MODIFIED_SINCE),
            if_unmodified_since: get(header::IF_UNMODIFIED_SINCE),
            if_match: get(header::IF_MATCH),
            if_none_match: get(header::IF_NONE_MATCH),
            if_range: get(header::IF_RANGE),
        }
    }
}

/// Outcome of precondition evaluation.
#[derive(Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// No precondition was terminal; serve the entity.
    Proceed,
    /// Respond 304 with the cache-validation headers.
    NotModified,
    /// Respond 412.
    PreconditionFailed,
}

/// Evaluate the preconditions against the entity's mtime and tag.
///
/// Order is fixed: If-Modified-Since, If-Match, If-Range,
/// If-Unmodified-Since, If-None-Match. If-Range is rejected outright since
/// range requests are unsupported; a conditional range request must not be
/// silently served in full.
pub fn evaluate(method: &Method, cond: &ConditionalHeaders, mtime: SystemTime, etag: &str) -> Evaluation {
    let mtime = secs(mtime);

    if let Some(since) = cond.if_modified_since {
        if secs(date_or_epoch(since)) >= mtime {
            return Evaluation::NotModified;
        }
    }

    if let Some(tags) = cond.if_match {
        if !tag_list_matches(tags, etag) {
            return Evaluation::PreconditionFailed;
        }
    }

    if cond.if_range.is_some() {
        return Evaluation::PreconditionFailed;
    }

    if let Some(since) = cond.if_unmodified_since {
        if secs(date_or_epoch(since)) <= mtime {
            return Evaluation::PreconditionFailed;
        }
    }

    if let Some(tags) = cond.if_none_match {
        if tag_list_matches(tags, etag) {
            return if *method == Method::GET || *method == Method::HEAD {
                Evaluation::NotModified
            } else {
                Evaluation::PreconditionFailed
            };
        }
    }

    Evaluation::Proceed
}

/// `value` is a comma/space-separated tag list; `*` matches everything.
fn tag_list_matches(value: &str, etag: &str) -> bool {
    value
        .split(|c: char| c == ',' || c == ' ')
        .filter(|tag| !tag.is_empty())
        .any(|tag| tag == "*" || tag == etag)
}

fn secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
