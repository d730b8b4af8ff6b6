//! RFC 3164 (BSD syslog) message parsing.
//!
//! `<PRI>Mmm dd hh:mm:ss HOSTNAME TAG[pid]: content`. The wire timestamp
//! has no year; it is parsed against the current year only so malformed
//! headers can be rejected, and normalization replaces it with the receipt
//! time regardless.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use coriolis_record::Rfc3164Message;

use super::{take_priority, take_token, ParseError};

/// `Mmm dd hh:mm:ss` is exactly 15 characters.
const TIMESTAMP_LEN: usize = 15;

/// Tags longer than this are treated as free-form content.
const MAX_TAG_LEN: usize = 32;

pub(super) fn parse(input: &str) -> Result<Rfc3164Message, ParseError> {
    let (priority, rest) = take_priority(input)?;

    if rest.len() < TIMESTAMP_LEN {
        return Err(ParseError::UnexpectedEnd);
    }
    let (stamp, rest) = rest.split_at(TIMESTAMP_LEN);
    let timestamp = parse_timestamp(stamp)?;
    let rest = rest.strip_prefix(' ').ok_or(ParseError::UnexpectedEnd)?;

    let (hostname, rest) = take_token(rest)?;
    let (tag, content) = split_tag(rest);

    Ok(Rfc3164Message {
        priority,
        timestamp: Some(timestamp),
        hostname: hostname.to_string(),
        tag: tag.to_string(),
        content: content.to_string(),
    })
}

fn parse_timestamp(stamp: &str) -> Result<DateTime<Utc>, ParseError> {
    let with_year = format!("{} {}", Utc::now().year(), stamp);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
        .map_err(|_| ParseError::InvalidTimestamp(stamp.into()))?;
    Ok(naive.and_utc())
}

/// Split `TAG[pid]: content` into tag and content.
///
/// A tag is a short run of tag characters terminated by `:` (optionally
/// with a bracketed pid). Anything else means the whole remainder is
/// content and the tag is empty, which the ingest worker later drops as
/// unpersistable.
fn split_tag(rest: &str) -> (&str, &str) {
    let end = rest
        .char_indices()
        .find(|(_, c)| !is_tag_char(*c))
        .map(|(pos, _)| pos)
        .unwrap_or(rest.len());

    if end == 0 || end > MAX_TAG_LEN {
        return ("", rest);
    }
    let tag = &rest[..end];
    let mut after = &rest[end..];

    // Optional bracketed pid, kept out of the tag.
    if let Some(stripped) = after.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => after = &stripped[close + 1..],
            None => return ("", rest),
        }
    }

    match after.strip_prefix(':') {
        Some(content) => (tag, content.strip_prefix(' ').unwrap_or(content)),
        None => ("", rest),
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}
