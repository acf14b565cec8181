use base64::Engine;

use crate::error::CodecError;

/// Encode binary media for a JSON-safe transport
pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a payload produced by [`to_base64`] (or by the remote service)
pub fn from_base64(encoded: &str) -> Result<Vec<u8>, CodecError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
}
