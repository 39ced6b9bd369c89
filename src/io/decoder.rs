//! Payload decoding
//!
//! Frames arrive as plain text, hexadecimal text or Base64 text. Decoding
//! failures are local to a single frame: [`decode`] yields an empty string and
//! the frame contributes no data.

use crate::config::DecoderMethod;
use crate::error::{Result, SerialVisError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Decode a payload into raw bytes
///
/// Hexadecimal and Base64 payloads may be surrounded by ASCII whitespace.
pub fn decode_bytes(bytes: &[u8], method: DecoderMethod) -> Result<Vec<u8>> {
    match method {
        DecoderMethod::PlainText => Ok(bytes.to_vec()),
        DecoderMethod::Hexadecimal => hex::decode(trim_ascii_whitespace(bytes))
            .map_err(|e| SerialVisError::Decode(format!("Invalid hexadecimal payload: {}", e))),
        DecoderMethod::Base64 => STANDARD
            .decode(trim_ascii_whitespace(bytes))
            .map_err(|e| SerialVisError::Decode(format!("Invalid Base64 payload: {}", e))),
    }
}

/// Decode a payload into text, lossy for invalid UTF-8
///
/// Returns an empty string when the payload cannot be decoded.
pub fn decode(bytes: &[u8], method: DecoderMethod) -> String {
    match decode_bytes(bytes, method) {
        Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
        Err(e) => {
            tracing::trace!("{}", e);
            String::new()
        }
    }
}

/// Encode raw bytes the way a device using `method` would send them
pub fn encode(bytes: &[u8], method: DecoderMethod) -> String {
    match method {
        DecoderMethod::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        DecoderMethod::Hexadecimal => hex::encode(bytes),
        DecoderMethod::Base64 => STANDARD.encode(bytes),
    }
}
