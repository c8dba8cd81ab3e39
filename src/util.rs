//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed strings,
//! plus topic filter matching.

use crate::error::{MqttError, ProtocolError};
use crate::transport::ErrorPlaceHolder;

/// Result of a parse that may need more input before it can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partial<T> {
    /// The value was decoded.
    Complete(T),
    /// The buffer ended before the value did.
    Incomplete,
}

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is a common encoding scheme in MQTT for packet lengths.
pub fn read_variable_byte_integer(
    cursor: &mut usize,
    buf: &[u8],
) -> Result<usize, MqttError<ErrorPlaceHolder>> {
    match peek_variable_byte_integer(&buf[(*cursor).min(buf.len())..])? {
        Partial::Complete((value, used)) => {
            *cursor += used;
            Ok(value)
        }
        Partial::Incomplete => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
    }
}

/// Decodes a variable-byte integer at the start of `buf` without a cursor.
///
/// Returns the value and the number of bytes it occupied, or `Incomplete` if
/// the buffer stops in the middle of the encoding.
pub fn peek_variable_byte_integer(
    buf: &[u8],
) -> Result<Partial<(usize, usize)>, MqttError<ErrorPlaceHolder>> {
    let mut multiplier = 1;
    let mut value = 0;
    for (i, encoded_byte) in buf.iter().enumerate() {
        if i >= 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            return Ok(Partial::Complete((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }
    Ok(Partial::Incomplete)
}

/// Writes a variable-byte integer at the start of `buf`, returning the byte count.
pub fn write_variable_byte_integer_len(
    buf: &mut [u8],
    mut val: usize,
) -> Result<usize, MqttError<ErrorPlaceHolder>> {
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16` from the buffer, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, MqttError<ErrorPlaceHolder>> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(
    cursor: &mut usize,
    buf: &'a [u8],
) -> Result<&'a str, MqttError<ErrorPlaceHolder>> {
    let len = read_u16(cursor, buf)? as usize;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?,
    )
    .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, MqttError<ErrorPlaceHolder>> {
    write_binary(buf, s.as_bytes())
}

/// Writes length-prefixed binary data (used for passwords) to the buffer.
pub fn write_binary(buf: &mut [u8], data: &[u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(data);
    Ok(required_space)
}

/// Checks whether a concrete topic name matches a subscription filter.
///
/// `+` matches exactly one level and `#` matches the remaining levels
/// (including none). Topics starting with `$` are not matched by a leading
/// wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_byte_integer_boundaries() {
        let mut buf = [0u8; 4];
        assert_eq!(write_variable_byte_integer_len(&mut buf, 127).unwrap(), 1);
        assert_eq!(write_variable_byte_integer_len(&mut buf, 128).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x80, 0x01]);
        assert_eq!(write_variable_byte_integer_len(&mut buf, 268_435_455).unwrap(), 4);

        let mut cursor = 0;
        assert_eq!(read_variable_byte_integer(&mut cursor, &buf).unwrap(), 268_435_455);
        assert_eq!(cursor, 4);
    }

    #[test]
    fn variable_byte_integer_needs_more_input() {
        assert_eq!(peek_variable_byte_integer(&[0x80]).unwrap(), Partial::Incomplete);
        assert_eq!(peek_variable_byte_integer(&[]).unwrap(), Partial::Incomplete);
        assert_eq!(
            peek_variable_byte_integer(&[0x80, 0x01, 0xFF]).unwrap(),
            Partial::Complete((128, 2))
        );
        assert!(peek_variable_byte_integer(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).is_err());
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut buf = [0u8; 8];
        assert_eq!(write_utf8_string(&mut buf, "abc").unwrap(), 5);
        assert_eq!(&buf[..5], &[0, 3, b'a', b'b', b'c']);
        let mut cursor = 0;
        assert_eq!(read_utf8_string(&mut cursor, &buf).unwrap(), "abc");
        assert_eq!(cursor, 5);

        let mut small = [0u8; 3];
        assert_eq!(write_utf8_string(&mut small, "abc"), Err(MqttError::BufferTooSmall));
        let mut cursor = 0;
        assert!(read_utf8_string(&mut cursor, &[0, 9, b'a']).is_err());
    }

    #[test]
    fn topic_filters() {
        assert!(topic_matches("hello/wiznet", "hello/wiznet"));
        assert!(!topic_matches("hello/wiznet", "hello/wiznet/x"));
        assert!(topic_matches("hello/+", "hello/wiznet"));
        assert!(!topic_matches("hello/+", "hello/a/b"));
        assert!(topic_matches("hello/#", "hello"));
        assert!(topic_matches("hello/#", "hello/a/b"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("#", "$SYS/broker"));
        assert!(topic_matches("$SYS/#", "$SYS/broker"));
    }
}
