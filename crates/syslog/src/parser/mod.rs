//! Hand-rolled syslog wire parsers.
//!
//! Fail-fast recursive-descent over string slices: each helper consumes
//! its token from the front of `rest` and returns the remainder. Regular
//! expressions would be slower and structured data is irregular enough to
//! need manual scanning anyway.

mod octet;
mod rfc3164;
mod rfc5424;

pub use octet::OctetDecoder;

use coriolis_record::ParsedMessage;
use thiserror::Error;

/// Wire format a listener is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Detect RFC 3164 vs RFC 5424 per message.
    Automatic,
    Rfc3164,
    Rfc5424,
    /// Octet-counted framing (stream transports); frames carry RFC 5424.
    Rfc6587,
}

/// A message that could not be parsed. Logged and dropped by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message does not start with a priority")]
    MissingPriority,

    #[error("invalid priority {0:?}")]
    InvalidPriority(String),

    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("unexpected end of message")]
    UnexpectedEnd,

    #[error("message is not valid utf-8")]
    InvalidUtf8,

    #[error("malformed structured data")]
    MalformedStructuredData,

    #[error("invalid octet count {0:?}")]
    InvalidOctetCount(String),

    #[error("frame of {0} bytes exceeds the maximum message size")]
    FrameTooLarge(usize),
}

/// Parse one wire message according to the configured format.
pub fn parse(format: LogFormat, data: &[u8]) -> Result<ParsedMessage, ParseError> {
    let input = std::str::from_utf8(data).map_err(|_| ParseError::InvalidUtf8)?;
    match format {
        LogFormat::Rfc3164 => rfc3164::parse(input).map(ParsedMessage::Rfc3164),
        // Octet framing is stripped by the transport; the payload is IETF.
        LogFormat::Rfc5424 | LogFormat::Rfc6587 => {
            rfc5424::parse(input).map(ParsedMessage::Rfc5424)
        }
        LogFormat::Automatic => {
            if looks_like_rfc5424(input) {
                rfc5424::parse(input).map(ParsedMessage::Rfc5424)
            } else {
                rfc3164::parse(input).map(ParsedMessage::Rfc3164)
            }
        }
    }
}

/// An RFC 5424 header continues the priority with `VERSION SP`.
fn looks_like_rfc5424(input: &str) -> bool {
    let Some(end) = input.find('>') else {
        return false;
    };
    let mut rest = input[end + 1..].chars();
    matches!(
        (rest.next(), rest.next()),
        (Some(version), Some(' ')) if version.is_ascii_digit()
    )
}

/// Consume `<PRI>` from the front of the message.
fn take_priority(input: &str) -> Result<(u8, &str), ParseError> {
    let rest = input.strip_prefix('<').ok_or(ParseError::MissingPriority)?;
    let end = rest.find('>').ok_or(ParseError::MissingPriority)?;
    let digits = &rest[..end];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPriority(digits.into()));
    }
    let priority: u16 = digits
        .parse()
        .map_err(|_| ParseError::InvalidPriority(digits.into()))?;
    if priority > 191 {
        return Err(ParseError::InvalidPriority(digits.into()));
    }
    Ok((priority as u8, &rest[end + 1..]))
}

/// Consume one space-terminated token.
fn take_token(input: &str) -> Result<(&str, &str), ParseError> {
    if input.is_empty() {
        return Err(ParseError::UnexpectedEnd);
    }
    match input.find(' ') {
        Some(pos) => Ok((&input[..pos], &input[pos + 1..])),
        None => Ok((input, "")),
    }
}
