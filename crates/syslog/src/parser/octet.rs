//! RFC 6587 octet-counted framing for stream transports.
//!
//! Each frame is `MSG-LEN SP` followed by exactly `MSG-LEN` bytes. The
//! decoder is incremental: feed it the connection's read buffer and pull
//! complete frames as they become available.

use bytes::{Buf, Bytes, BytesMut};

use super::ParseError;

/// Longest accepted decimal length prefix (5 digits ≤ 99999 bytes).
const MAX_COUNT_DIGITS: usize = 5;

/// Incremental octet-counted frame decoder.
#[derive(Debug)]
pub struct OctetDecoder {
    /// Maximum accepted frame size.
    max_frame: usize,
}

impl OctetDecoder {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }

    /// Pull the next complete frame out of `buf`, or `None` if more bytes
    /// are needed. Consumed bytes are removed from the buffer.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
        let Some(space) = buf
            .iter()
            .take(MAX_COUNT_DIGITS + 1)
            .position(|&b| b == b' ')
        else {
            if buf.len() > MAX_COUNT_DIGITS {
                return Err(ParseError::InvalidOctetCount(
                    String::from_utf8_lossy(&buf[..MAX_COUNT_DIGITS]).into_owned(),
                ));
            }
            return Ok(None);
        };

        let digits = &buf[..space];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(ParseError::InvalidOctetCount(
                String::from_utf8_lossy(digits).into_owned(),
            ));
        }
        // At most five ascii digits; cannot overflow.
        let count: usize = std::str::from_utf8(digits)
            .map_err(|_| ParseError::InvalidUtf8)?
            .parse()
            .map_err(|_| ParseError::InvalidOctetCount(String::from_utf8_lossy(digits).into_owned()))?;

        if count > self.max_frame {
            return Err(ParseError::FrameTooLarge(count));
        }
        if buf.len() < space + 1 + count {
            return Ok(None);
        }

        buf.advance(space + 1);
        Ok(Some(buf.split_to(count).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> OctetDecoder {
        OctetDecoder::new(8192)
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut buf = BytesMut::from(&b"5 hello3 abc"[..]);
        let d = decoder();
        assert_eq!(d.decode(&mut buf).unwrap().unwrap(), "hello");
        assert_eq!(d.decode(&mut buf).unwrap().unwrap(), "abc");
        assert_eq!(d.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let d = decoder();
        let mut buf = BytesMut::from(&b"11 hello"[..]);
        assert_eq!(d.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" world");
        assert_eq!(d.decode(&mut buf).unwrap().unwrap(), "hello world");
    }

    #[test]
    fn waits_for_the_length_prefix() {
        let d = decoder();
        let mut buf = BytesMut::from(&b"12"[..]);
        assert_eq!(d.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn rejects_non_numeric_prefixes() {
        let d = decoder();
        let mut buf = BytesMut::from(&b"nope hello"[..]);
        assert!(matches!(
            d.decode(&mut buf),
            Err(ParseError::InvalidOctetCount(_))
        ));
    }

    #[test]
    fn rejects_unterminated_prefixes() {
        let d = decoder();
        let mut buf = BytesMut::from(&b"123456"[..]);
        assert!(matches!(
            d.decode(&mut buf),
            Err(ParseError::InvalidOctetCount(_))
        ));
    }

    #[test]
    fn rejects_oversized_frames() {
        let d = OctetDecoder::new(4);
        let mut buf = BytesMut::from(&b"5 hello"[..]);
        assert_eq!(d.decode(&mut buf), Err(ParseError::FrameTooLarge(5)));
    }
}
