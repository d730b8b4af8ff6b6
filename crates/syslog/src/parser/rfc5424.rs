//! RFC 5424 (IETF syslog) message parsing.
//!
//! `<PRI>VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID
//! SP STRUCTURED-DATA [SP MSG]`. Nil fields (`-`) become empty strings;
//! structured data is validated and skipped, not interpreted.

use chrono::{DateTime, Utc};
use coriolis_record::Rfc5424Message;

use super::{take_priority, take_token, ParseError};

pub(super) fn parse(input: &str) -> Result<Rfc5424Message, ParseError> {
    let (priority, rest) = take_priority(input)?;

    let (version, rest) = take_token(rest)?;
    if version != "1" {
        return Err(ParseError::UnsupportedVersion(version.into()));
    }

    let (stamp, rest) = take_token(rest)?;
    let timestamp = parse_timestamp(stamp)?;

    let (hostname, rest) = take_token(rest)?;
    let (app_name, rest) = take_token(rest)?;
    let (proc_id, rest) = take_token(rest)?;
    let (msg_id, rest) = take_token(rest)?;
    let message = skip_structured_data(rest)?;

    Ok(Rfc5424Message {
        priority,
        timestamp,
        hostname: nil_to_empty(hostname),
        app_name: nil_to_empty(app_name),
        proc_id: proc_id.to_string(),
        msg_id: nil_to_empty(msg_id),
        message: message.to_string(),
    })
}

fn nil_to_empty(token: &str) -> String {
    if token == "-" {
        String::new()
    } else {
        token.to_string()
    }
}

fn parse_timestamp(stamp: &str) -> Result<Option<DateTime<Utc>>, ParseError> {
    if stamp == "-" {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(stamp)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|_| ParseError::InvalidTimestamp(stamp.into()))
}

/// Step over the structured-data element and return the message text.
///
/// Either a single `-` or one or more `[id key="value" ...]` elements,
/// where values may contain escaped `]` and `"`.
fn skip_structured_data(rest: &str) -> Result<&str, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::UnexpectedEnd);
    }
    if let Some(msg) = rest.strip_prefix("- ") {
        return Ok(msg);
    }
    if rest == "-" {
        return Ok("");
    }

    let mut chars = rest.char_indices().peekable();
    loop {
        match chars.next() {
            Some((_, '[')) => scan_element(&mut chars)?,
            Some((pos, ' ')) => return Ok(&rest[pos + 1..]),
            Some(_) => return Err(ParseError::MalformedStructuredData),
            None => return Ok(""),
        }
    }
}

/// Consume one `[...]` element, honoring quoted values and escapes.
fn scan_element(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<(), ParseError> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ']' if !in_quotes => return Ok(()),
            _ => {}
        }
    }
    Err(ParseError::MalformedStructuredData)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_a_full_message() {
        let msg = parse("<14>1 2024-01-02T03:04:05Z host1 myapp 42 - - hello").unwrap();
        assert_eq!(msg.priority, 14);
        assert_eq!(
            msg.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(msg.hostname, "host1");
        assert_eq!(msg.app_name, "myapp");
        assert_eq!(msg.proc_id, "42");
        assert_eq!(msg.msg_id, "");
        assert_eq!(msg.message, "hello");
    }

    #[test]
    fn offset_timestamps_are_normalized_to_utc() {
        let msg = parse("<165>1 2003-10-11T22:14:15.003+02:00 host app - ID47 - msg").unwrap();
        let expected = Utc
            .with_ymd_and_hms(2003, 10, 11, 20, 14, 15)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(3))
            .unwrap();
        assert_eq!(msg.timestamp, Some(expected));
        assert_eq!(msg.msg_id, "ID47");
    }

    #[test]
    fn nil_fields_become_empty() {
        let msg = parse("<14>1 - - - - - -").unwrap();
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.hostname, "");
        assert_eq!(msg.app_name, "");
        assert_eq!(msg.proc_id, "-");
        assert_eq!(msg.message, "");
    }

    #[test]
    fn structured_data_is_skipped() {
        let msg = parse(
            r#"<14>1 - host app - - [exampleSDID@32473 iut="3" eventSource="App \] ok"] payload"#,
        )
        .unwrap();
        assert_eq!(msg.message, "payload");
    }

    #[test]
    fn multiple_sd_elements_are_skipped() {
        let msg = parse(r#"<14>1 - host app - - [a x="1"][b y="2"] tail"#).unwrap();
        assert_eq!(msg.message, "tail");
    }

    #[test]
    fn message_may_be_absent() {
        let msg = parse(r#"<14>1 - host app - - [a x="1"]"#).unwrap();
        assert_eq!(msg.message, "");
    }

    #[test]
    fn unterminated_sd_is_an_error() {
        assert_eq!(
            parse(r#"<14>1 - host app - - [a x="1""#),
            Err(ParseError::MalformedStructuredData)
        );
    }

    #[test]
    fn version_other_than_one_is_rejected() {
        assert_eq!(
            parse("<14>2 - host app - - - msg"),
            Err(ParseError::UnsupportedVersion("2".into()))
        );
    }
}
